//! Sparse interaction matrices and the per-user stratified train/test split.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use super::mapping::IdMapper;
use crate::error::{RecommenderError, RecommenderResult};
use crate::models::Rating;

/// Compressed sparse row matrix of `f32` values
///
/// Column indices inside each row are sorted and unique; explicit zeros are
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f32>,
}

/// Borrowed view of one matrix row
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [usize],
    pub values: &'a [f32],
}

impl<'a> SparseRow<'a> {
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + 'a {
        let (indices, values) = (self.indices, self.values);
        indices.iter().copied().zip(values.iter().copied())
    }

    pub fn contains(&self, col: usize) -> bool {
        self.indices.binary_search(&col).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }
}

impl CsrMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            indptr: vec![0; rows + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Builds a matrix from `(row, col, value)` triplets
    ///
    /// Duplicate coordinates are folded together with `combine`. Triplets
    /// outside the shape are rejected.
    pub fn from_triplets<F>(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f32)],
        combine: F,
    ) -> RecommenderResult<Self>
    where
        F: Fn(f32, f32) -> f32,
    {
        let mut per_row: Vec<Vec<(usize, f32)>> = vec![Vec::new(); rows];
        for &(r, c, v) in triplets {
            if r >= rows || c >= cols {
                return Err(RecommenderError::Preprocessing(format!(
                    "entry ({}, {}) outside matrix shape ({}, {})",
                    r, c, rows, cols
                )));
            }
            per_row[r].push((c, v));
        }

        let mut indptr = Vec::with_capacity(rows + 1);
        let mut indices = Vec::with_capacity(triplets.len());
        let mut data = Vec::with_capacity(triplets.len());
        indptr.push(0);

        for mut entries in per_row {
            entries.sort_by_key(|&(c, _)| c);
            let mut folded: Vec<(usize, f32)> = Vec::with_capacity(entries.len());
            for (c, v) in entries {
                match folded.last_mut() {
                    Some(last) if last.0 == c => last.1 = combine(last.1, v),
                    _ => folded.push((c, v)),
                }
            }
            for (c, v) in folded {
                if v != 0.0 {
                    indices.push(c);
                    data.push(v);
                }
            }
            indptr.push(indices.len());
        }

        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored (non-zero) entries
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn row(&self, r: usize) -> SparseRow<'_> {
        if r >= self.rows {
            return SparseRow {
                indices: &[],
                values: &[],
            };
        }
        let (start, end) = (self.indptr[r], self.indptr[r + 1]);
        SparseRow {
            indices: &self.indices[start..end],
            values: &self.data[start..end],
        }
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        let row = self.row(r);
        row.indices
            .binary_search(&c)
            .map(|pos| row.values[pos])
            .unwrap_or(0.0)
    }

    /// All stored entries as `(row, col, value)`, row-major
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.rows).flat_map(move |r| self.row(r).iter().map(move |(c, v)| (r, c, v)))
    }

    /// Swaps orientation (user-major ↔ item-major)
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.cols + 1];
        for &c in &self.indices {
            counts[c + 1] += 1;
        }
        for c in 0..self.cols {
            counts[c + 1] += counts[c];
        }
        let indptr = counts.clone();
        let mut next = counts;
        let mut indices = vec![0usize; self.nnz()];
        let mut data = vec![0f32; self.nnz()];

        // rows are visited in order, so each transposed row stays sorted
        for r in 0..self.rows {
            for (c, v) in self.row(r).iter() {
                let slot = next[c];
                indices[slot] = r;
                data[slot] = v;
                next[c] += 1;
            }
        }

        Self {
            rows: self.cols,
            cols: self.rows,
            indptr,
            indices,
            data,
        }
    }

    /// Checks the structural invariants of a matrix read from untrusted bytes
    pub fn validate(&self) -> Result<(), String> {
        if self.indptr.len() != self.rows + 1 {
            return Err(format!(
                "indptr has {} entries for {} rows",
                self.indptr.len(),
                self.rows
            ));
        }
        if self.indices.len() != self.data.len() {
            return Err("indices and data differ in length".to_string());
        }
        if self.indptr.first() != Some(&0) || self.indptr.last() != Some(&self.indices.len()) {
            return Err("indptr does not span the stored entries".to_string());
        }
        for r in 0..self.rows {
            let (start, end) = (self.indptr[r], self.indptr[r + 1]);
            if start > end {
                return Err(format!("indptr decreases at row {}", r));
            }
            let row = &self.indices[start..end];
            if row.iter().any(|&c| c >= self.cols) {
                return Err(format!("row {} has a column outside {}", r, self.cols));
            }
            if row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("row {} columns are not strictly increasing", r));
            }
        }
        Ok(())
    }
}

/// Behaviour for users whose ratings cannot be stratified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Fail with `InsufficientDataForSplit`
    Strict,
    /// Keep all of that user's ratings in train
    #[default]
    RouteToTrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub policy: SplitPolicy,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            policy: SplitPolicy::RouteToTrain,
        }
    }
}

/// Positions into the rating slice assigned to each side of the split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// Users routed wholly into train because they had a single rating
    pub unstratified_users: usize,
}

/// Splits ratings into train/test so every user appears on both sides
///
/// Each user with `n >= 2` ratings contributes `round(n * test_fraction)`
/// ratings to test, clamped to `[1, n - 1]`.
pub fn stratified_split(ratings: &[Rating], config: &SplitConfig) -> RecommenderResult<Split> {
    if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
        return Err(RecommenderError::InvalidParameter(format!(
            "test fraction must be in (0, 1), got {}",
            config.test_fraction
        )));
    }

    let mut users = IdMapper::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (pos, rating) in ratings.iter().enumerate() {
        let u = users.insert(rating.user_id);
        if u == groups.len() {
            groups.push(Vec::new());
        }
        groups[u].push(pos);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut split = Split::default();

    for (u, mut group) in groups.into_iter().enumerate() {
        let n = group.len();
        if n < 2 {
            match config.policy {
                SplitPolicy::Strict => {
                    return Err(RecommenderError::InsufficientDataForSplit {
                        user_id: users.raw_id(u).unwrap_or_default(),
                        ratings: n,
                    });
                }
                SplitPolicy::RouteToTrain => {
                    split.unstratified_users += 1;
                    split.train.extend(group);
                    continue;
                }
            }
        }

        group.shuffle(&mut rng);
        let n_test = ((n as f64 * config.test_fraction).round() as usize).clamp(1, n - 1);
        split.test.extend_from_slice(&group[..n_test]);
        split.train.extend_from_slice(&group[n_test..]);
    }

    split.train.sort_unstable();
    split.test.sort_unstable();
    Ok(split)
}

/// Confidence weight for an explicit rating on a 0–5 scale
pub fn confidence(rating: f32, alpha: f32) -> f32 {
    1.0 + alpha * rating / 5.0
}

/// Train confidences and binary held-out relevance, both `(users, items)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionMatrices {
    pub train: CsrMatrix,
    pub test: CsrMatrix,
}

/// Builds the train and test matrices through the identifier mappings
///
/// Every rating must refer to ids present in `users` and `items`.
pub fn build_interactions(
    ratings: &[Rating],
    users: &IdMapper,
    items: &IdMapper,
    threshold: f32,
    alpha: f32,
    split_config: &SplitConfig,
) -> RecommenderResult<InteractionMatrices> {
    let split = stratified_split(ratings, split_config)?;

    let locate = |rating: &Rating| -> RecommenderResult<(usize, usize)> {
        let u = users
            .index_of(rating.user_id)
            .ok_or(RecommenderError::NotFoundUser(rating.user_id))?;
        let i = items
            .index_of(rating.movie_id)
            .ok_or(RecommenderError::NotFoundItem(rating.movie_id))?;
        Ok((u, i))
    };

    let mut train_entries = Vec::with_capacity(split.train.len());
    for &pos in &split.train {
        let rating = &ratings[pos];
        let (u, i) = locate(rating)?;
        train_entries.push((u, i, confidence(rating.rating, alpha)));
    }

    let mut test_entries = Vec::with_capacity(split.test.len());
    for &pos in &split.test {
        let rating = &ratings[pos];
        let (u, i) = locate(rating)?;
        let relevant = if rating.rating >= threshold { 1.0 } else { 0.0 };
        test_entries.push((u, i, relevant));
    }

    let train = CsrMatrix::from_triplets(users.len(), items.len(), &train_entries, |a, b| a + b)?;
    let test = CsrMatrix::from_triplets(users.len(), items.len(), &test_entries, f32::max)?;

    tracing::info!(
        train_ratings = split.train.len(),
        test_ratings = split.test.len(),
        unstratified_users = split.unstratified_users,
        train_nnz = train.nnz(),
        relevant_test_nnz = test.nnz(),
        "Interaction matrices built"
    );

    Ok(InteractionMatrices { train, test })
}
