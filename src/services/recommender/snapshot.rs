//! Self-contained binary snapshot of a trained engine.
//!
//! Layout: the 8-byte magic `HRECSNAP`, a little-endian `u32` format
//! version, then the bincode-encoded [`Snapshot`].

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::als::AlsParams;
use super::features::FeatureMatrix;
use super::interactions::CsrMatrix;
use super::mapping::IdMapper;
use crate::error::{RecommenderError, RecommenderResult};
use crate::models::{MovieInfo, RawId};

pub const MAGIC: &[u8; 8] = b"HRECSNAP";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + std::mem::size_of::<u32>();

/// Every piece of trained state, persisted as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub params: AlsParams,
    pub content_weight: f32,
    pub rating_threshold: f32,
    pub users: IdMapper,
    pub items: IdMapper,
    /// Feature rows in item dense-index order
    pub features: FeatureMatrix,
    pub similarity: Array2<f32>,
    pub catalog: Vec<MovieInfo>,
    pub train: CsrMatrix,
    pub test: CsrMatrix,
    pub user_factors: Array2<f32>,
    pub item_factors: Array2<f32>,
    pub training_loss: Vec<f64>,
}

impl Snapshot {
    pub fn to_bytes(&self) -> RecommenderResult<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes and checks that every dimension agrees
    pub fn from_bytes(bytes: &[u8]) -> RecommenderResult<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(RecommenderError::Serialization("not a recommender snapshot".to_string()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(RecommenderError::Serialization(format!(
                "unsupported snapshot version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let snapshot: Snapshot = bincode::deserialize(&bytes[HEADER_LEN..])?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Writes to a sibling temp file first, then renames over `path`
    pub fn save(&self, path: &Path) -> RecommenderResult<()> {
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("tmp");

        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            RecommenderError::Serialization(format!("writing {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Snapshot saved");
        Ok(())
    }

    pub fn load(path: &Path) -> RecommenderResult<Self> {
        let bytes = fs::read(path).map_err(|e| {
            RecommenderError::Serialization(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    fn validate(&self) -> RecommenderResult<()> {
        let users = self.users.len();
        let items = self.items.len();
        let factors = self.params.factors;

        let mut problems = Vec::new();
        let mut expect = |what: &str, actual: (usize, usize), expected: (usize, usize)| {
            if actual != expected {
                problems.push(format!("{} is {:?}, expected {:?}", what, actual, expected));
            }
        };

        expect("train matrix", self.train.shape(), (users, items));
        expect("test matrix", self.test.shape(), (users, items));
        expect("user factors", self.user_factors.dim(), (users, factors));
        expect("item factors", self.item_factors.dim(), (items, factors));
        expect("similarity", self.similarity.dim(), (items, items));
        expect(
            "features",
            self.features.values.dim(),
            (items, self.features.vocabulary.len()),
        );

        for (name, matrix) in [("train", &self.train), ("test", &self.test)] {
            if let Err(e) = matrix.validate() {
                problems.push(format!("{} matrix: {}", name, e));
            }
        }
        if !(0.0..=1.0).contains(&self.content_weight) {
            problems.push(format!("content weight {} outside [0, 1]", self.content_weight));
        }
        let cataloged: HashSet<RawId> = self.catalog.iter().map(|m| m.movie_id).collect();
        if let Some(missing) = self
            .items
            .raw_ids()
            .iter()
            .find(|id| !cataloged.contains(*id))
        {
            problems.push(format!("movie {} missing from catalog", missing));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RecommenderError::Serialization(format!(
                "inconsistent snapshot: {}",
                problems.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tiny() -> Snapshot {
        let params = AlsParams {
            factors: 2,
            ..AlsParams::default()
        };
        Snapshot {
            snapshot_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            params,
            content_weight: 0.25,
            rating_threshold: 4.0,
            users: IdMapper::from_ids([7]),
            items: IdMapper::from_ids([10, 20]),
            features: FeatureMatrix {
                vocabulary: vec!["Drama".to_string(), "year".to_string()],
                genre_columns: 1,
                tag_columns: 0,
                values: Array2::from_shape_vec((2, 2), vec![1.0, 0.5, 1.0, 0.0]).unwrap(),
            },
            similarity: Array2::eye(2),
            catalog: vec![
                MovieInfo {
                    movie_id: 10,
                    title: "A (2000)".to_string(),
                    genres: vec!["Drama".to_string()],
                    year: Some(2000),
                    top_tags: None,
                },
                MovieInfo {
                    movie_id: 20,
                    title: "B".to_string(),
                    genres: vec!["Drama".to_string()],
                    year: None,
                    top_tags: None,
                },
            ],
            train: CsrMatrix::from_triplets(1, 2, &[(0, 0, 33.0)], |a, b| a + b).unwrap(),
            test: CsrMatrix::from_triplets(1, 2, &[(0, 1, 1.0)], f32::max).unwrap(),
            user_factors: Array2::from_elem((1, 2), 0.5),
            item_factors: Array2::from_elem((2, 2), 0.25),
            training_loss: vec![3.0, 2.0],
        }
    }

    #[test]
    fn test_bytes_round_trip() {
        let snapshot = tiny();
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(Snapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = tiny().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Snapshot::from_bytes(&bytes),
            Err(RecommenderError::Serialization(_))
        ));
        assert!(Snapshot::from_bytes(b"HREC").is_err());
    }

    #[test]
    fn test_rejects_other_version() {
        let mut bytes = tiny().to_bytes().unwrap();
        let next = (FORMAT_VERSION + 1).to_le_bytes();
        bytes[8..12].copy_from_slice(&next);
        let err = Snapshot::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let bytes = tiny().to_bytes().unwrap();
        let result = Snapshot::from_bytes(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(RecommenderError::Serialization(_))));
    }

    #[test]
    fn test_rejects_mismatched_dimensions() {
        let mut snapshot = tiny();
        snapshot.item_factors = Array2::zeros((3, 2));
        let bytes = snapshot.to_bytes().unwrap();
        let err = Snapshot::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("item factors"));
    }

    #[test]
    fn test_rejects_items_missing_from_catalog() {
        let mut snapshot = tiny();
        snapshot.catalog.retain(|m| m.movie_id != 20);
        let bytes = snapshot.to_bytes().unwrap();
        let err = Snapshot::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("movie 20 missing from catalog"));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("model.bin");
        let snapshot = tiny();

        snapshot.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Snapshot::load(&dir.path().join("absent.bin"));
        assert!(matches!(result, Err(RecommenderError::Serialization(_))));
    }
}
