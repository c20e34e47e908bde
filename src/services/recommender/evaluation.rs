//! Offline ranking metrics against the held-out matrix.

use std::collections::HashSet;

use super::als::AlternatingLeastSquares;
use super::interactions::CsrMatrix;
use crate::error::{RecommenderError, RecommenderResult};
use crate::models::EvaluationReport;

/// Precision@K, MAP@K and NDCG@K of the model's top-K lists
///
/// Recommendations exclude each user's train items. Users without any
/// relevant held-out item are skipped.
pub fn evaluate(
    model: &AlternatingLeastSquares,
    train: &CsrMatrix,
    test: &CsrMatrix,
    k: usize,
) -> RecommenderResult<EvaluationReport> {
    if k == 0 {
        return Err(RecommenderError::InvalidParameter("K must be at least 1".to_string()));
    }

    let mut hits_total = 0usize;
    let mut possible_total = 0usize;
    let mut average_precision_sum = 0.0;
    let mut ndcg_sum = 0.0;
    let mut users_evaluated = 0usize;

    for u in 0..test.rows() {
        let relevant: HashSet<usize> = test
            .row(u)
            .iter()
            .filter(|&(_, v)| v > 0.0)
            .map(|(i, _)| i)
            .collect();
        if relevant.is_empty() {
            continue;
        }

        let ranked = model.recommend(u, train.row(u), k, true)?;
        let possible = k.min(relevant.len());

        let mut hits = 0usize;
        let mut precision_sum = 0.0;
        let mut dcg = 0.0;
        for (rank, (item, _)) in ranked.iter().enumerate() {
            if relevant.contains(item) {
                hits += 1;
                precision_sum += hits as f64 / (rank + 1) as f64;
                dcg += discount(rank);
            }
        }
        let idcg: f64 = (0..possible).map(discount).sum();

        hits_total += hits;
        possible_total += possible;
        average_precision_sum += precision_sum / possible as f64;
        ndcg_sum += dcg / idcg;
        users_evaluated += 1;
    }

    let report = if users_evaluated == 0 {
        EvaluationReport {
            k,
            precision: 0.0,
            map: 0.0,
            ndcg: 0.0,
            users_evaluated,
        }
    } else {
        EvaluationReport {
            k,
            precision: hits_total as f64 / possible_total as f64,
            map: average_precision_sum / users_evaluated as f64,
            ndcg: ndcg_sum / users_evaluated as f64,
            users_evaluated,
        }
    };

    tracing::info!(
        k,
        users_evaluated,
        precision = report.precision,
        map = report.map,
        ndcg = report.ndcg,
        "Evaluation finished"
    );

    Ok(report)
}

fn discount(rank: usize) -> f64 {
    1.0 / ((rank + 2) as f64).log2()
}
