//! Fusion of collaborative and content-based scores.

use std::cmp::Ordering;

use ndarray::Array2;

use super::interactions::SparseRow;

/// Candidates fetched per requested result, to survive fusion-time filtering
pub const CANDIDATE_MULTIPLIER: usize = 2;

/// Number of top-rated items used as the user's favorites
pub const FAVORITE_COUNT: usize = 3;

/// Score forced onto already-seen items so they can never rank
pub const EXCLUDED_SCORE: f32 = -1.0;

fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

/// The user's highest-confidence items, strongest first
pub fn favorites(user_row: SparseRow<'_>, count: usize) -> Vec<(usize, f32)> {
    let mut rated: Vec<(usize, f32)> = user_row.iter().filter(|&(_, w)| w > 0.0).collect();
    rated.sort_by(by_score_desc);
    rated.truncate(count);
    rated
}

/// The `n` items most similar to `item`, excluding the item itself
pub fn most_similar(similarity: &Array2<f32>, item: usize, n: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = similarity
        .row(item)
        .iter()
        .copied()
        .enumerate()
        .filter(|&(j, _)| j != item)
        .collect();
    ranked.sort_by(by_score_desc);
    ranked.truncate(n);
    ranked
}

/// Accumulated content score per item, scaled so the maximum is 1
///
/// Each favorite adds `similarity × favorite weight` to its `neighbors` most
/// similar items. Left unscaled when nothing scored above zero.
pub fn content_scores(
    similarity: &Array2<f32>,
    favorites: &[(usize, f32)],
    neighbors: usize,
) -> Vec<f32> {
    let mut scores = vec![0.0f32; similarity.nrows()];
    for &(favorite, weight) in favorites {
        if weight <= 0.0 {
            continue;
        }
        for (j, sim) in most_similar(similarity, favorite, neighbors) {
            scores[j] += sim * weight;
        }
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > 0.0 {
        for s in &mut scores {
            *s /= max;
        }
    }
    scores
}

/// Dense per-item collaborative scores; items not among `candidates` score 0
pub fn collaborative_scores(candidates: &[(usize, f32)], num_items: usize) -> Vec<f32> {
    let mut scores = vec![0.0f32; num_items];
    for &(item, score) in candidates {
        if item < num_items {
            scores[item] = score;
        }
    }
    scores
}

/// `(1 − w)·cf + w·content`, element-wise
pub fn fuse(cf: &[f32], content: &[f32], content_weight: f32) -> Vec<f32> {
    cf.iter()
        .zip(content)
        .map(|(c, s)| (1.0 - content_weight) * c + content_weight * s)
        .collect()
}

/// Forces every item present in `user_row` to `EXCLUDED_SCORE`
pub fn exclude_seen(scores: &mut [f32], user_row: SparseRow<'_>) {
    for (item, _) in user_row.iter() {
        if let Some(score) = scores.get_mut(item) {
            *score = EXCLUDED_SCORE;
        }
    }
}

/// Best `n` strictly positive scores, best first
pub fn top_positive(scores: &[f32], n: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, s)| s > 0.0)
        .collect();
    ranked.sort_by(by_score_desc);
    ranked.truncate(n);
    ranked
}
