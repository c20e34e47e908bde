use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RawId;

/// One ranked recommendation, translated back to the raw movie id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub movie_id: RawId,
    pub score: f32,
}

/// Ranking-quality metrics over the held-out matrix
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    pub k: usize,
    pub precision: f64,
    pub map: f64,
    pub ndcg: f64,
    /// Users that had at least one relevant held-out item
    pub users_evaluated: usize,
}

impl EvaluationReport {
    /// Metrics keyed as `precision@K`, `map@K`, `ndcg@K`
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            (format!("precision@{}", self.k), self.precision),
            (format!("map@{}", self.k), self.map),
            (format!("ndcg@{}", self.k), self.ndcg),
        ])
    }
}

/// Descriptive metadata of the active snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotInfo {
    pub snapshot_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub users: usize,
    pub movies: usize,
    pub factors: usize,
    pub content_weight: f32,
    pub final_training_loss: Option<f64>,
}
