//! Implicit-feedback matrix factorization trained by alternating least squares.
//!
//! Minimizes `Σ c(u,i)·(p(u,i) − x_u·y_i)² + λ(‖X‖² + ‖Y‖²)` where `c` is the
//! stored confidence (1 for unobserved pairs) and `p` is 1 for observed pairs.
//! Each half-step solves `(YᵀY + Yᵀ(C_u − I)Y + λI)·x_u = YᵀC_u·p_u` per row.

use std::time::Instant;

use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::interactions::{CsrMatrix, SparseRow};
use crate::error::{RecommenderError, RecommenderResult};

/// Scale of the uniform random factor initialization
const INIT_SCALE: f64 = 0.01;

/// Where the per-row normal equations are solved
///
/// Both backends produce identical factors; `Threaded` only spreads the
/// independent row solves of each half-step over the rayon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    #[default]
    Cpu,
    Threaded,
}

/// Hyperparameters of the latent-factor model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlsParams {
    pub factors: usize,
    pub regularization: f32,
    /// Confidence scale used when ratings are turned into confidences
    pub alpha: f32,
    pub iterations: usize,
    pub backend: ComputeBackend,
    pub seed: u64,
}

impl Default for AlsParams {
    fn default() -> Self {
        Self {
            factors: 100,
            regularization: 0.01,
            alpha: 40.0,
            iterations: 20,
            backend: ComputeBackend::Cpu,
            seed: 42,
        }
    }
}

impl AlsParams {
    pub fn validate(&self) -> RecommenderResult<()> {
        if self.factors == 0 {
            return Err(RecommenderError::InvalidParameter(
                "factor count must be positive".to_string(),
            ));
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(RecommenderError::InvalidParameter(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            )));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(RecommenderError::InvalidParameter(format!(
                "alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Trained user and item factors
#[derive(Debug, Clone, PartialEq)]
pub struct AlternatingLeastSquares {
    params: AlsParams,
    user_factors: Array2<f32>,
    item_factors: Array2<f32>,
    training_loss: Vec<f64>,
}

impl AlternatingLeastSquares {
    /// Trains on an item-major `(items, users)` confidence matrix
    ///
    /// Always runs exactly `params.iterations` rounds.
    pub fn fit(params: AlsParams, item_users: &CsrMatrix) -> RecommenderResult<Self> {
        params.validate()?;
        let start = Instant::now();
        let (num_items, num_users) = item_users.shape();
        let user_items = item_users.transpose();
        let reg = params.regularization as f64;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut user_factors = random_factors(num_users, params.factors, &mut rng);
        let mut item_factors = random_factors(num_items, params.factors, &mut rng);

        let mut training_loss = Vec::with_capacity(params.iterations);
        for iteration in 0..params.iterations {
            user_factors = solve_half_step(&user_items, &item_factors, reg, params.backend)?;
            item_factors = solve_half_step(item_users, &user_factors, reg, params.backend)?;

            let loss = objective(&user_items, &user_factors, &item_factors, reg);
            tracing::debug!(iteration, loss, "ALS iteration complete");
            training_loss.push(loss);
        }

        tracing::info!(
            users = num_users,
            items = num_items,
            factors = params.factors,
            iterations = params.iterations,
            backend = ?params.backend,
            final_loss = training_loss.last().copied(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ALS training finished"
        );

        Ok(Self {
            params,
            user_factors: user_factors.mapv(|v| v as f32),
            item_factors: item_factors.mapv(|v| v as f32),
            training_loss,
        })
    }

    /// Reassembles a trained model, checking factor shapes
    pub fn from_parts(
        params: AlsParams,
        user_factors: Array2<f32>,
        item_factors: Array2<f32>,
        training_loss: Vec<f64>,
    ) -> RecommenderResult<Self> {
        if user_factors.ncols() != params.factors || item_factors.ncols() != params.factors {
            return Err(RecommenderError::Serialization(format!(
                "factor matrices have {} and {} columns, expected {}",
                user_factors.ncols(),
                item_factors.ncols(),
                params.factors
            )));
        }
        Ok(Self {
            params,
            user_factors,
            item_factors,
            training_loss,
        })
    }

    pub fn params(&self) -> &AlsParams {
        &self.params
    }

    pub fn user_factors(&self) -> &Array2<f32> {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &Array2<f32> {
        &self.item_factors
    }

    /// Objective value recorded after each iteration
    pub fn training_loss(&self) -> &[f64] {
        &self.training_loss
    }

    pub fn num_users(&self) -> usize {
        self.user_factors.nrows()
    }

    pub fn num_items(&self) -> usize {
        self.item_factors.nrows()
    }

    /// Predicted preference of one user for every item
    pub fn scores(&self, user_index: usize) -> RecommenderResult<Array1<f32>> {
        if user_index >= self.num_users() {
            return Err(RecommenderError::UserIndexOutOfRange {
                index: user_index,
                len: self.num_users(),
            });
        }
        Ok(self.item_factors.dot(&self.user_factors.row(user_index)))
    }

    /// Top `n` items for a user, best first
    ///
    /// With `filter_seen`, items stored in `user_row` are never returned.
    pub fn recommend(
        &self,
        user_index: usize,
        user_row: SparseRow<'_>,
        n: usize,
        filter_seen: bool,
    ) -> RecommenderResult<Vec<(usize, f32)>> {
        let scores = self.scores(user_index)?;
        let mut ranked: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(item, _)| !(filter_seen && user_row.contains(*item)))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(n);
        Ok(ranked)
    }
}

fn random_factors(rows: usize, factors: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((rows, factors), |_| rng.gen::<f64>() * INIT_SCALE)
}

/// Solves every row of `interactions` against the fixed factors
fn solve_half_step(
    interactions: &CsrMatrix,
    fixed: &Array2<f64>,
    reg: f64,
    backend: ComputeBackend,
) -> RecommenderResult<Array2<f64>> {
    let factors = fixed.ncols();
    let rows = interactions.rows();
    let mut gram = fixed.t().dot(fixed);
    for k in 0..factors {
        gram[[k, k]] += reg;
    }

    let mut solved = Array2::<f64>::zeros((rows, factors));
    match backend {
        ComputeBackend::Cpu => {
            for (r, mut out) in solved.axis_iter_mut(Axis(0)).enumerate() {
                out.assign(&solve_row(interactions.row(r), fixed, &gram)?);
            }
        }
        ComputeBackend::Threaded => {
            solved
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .try_for_each(|(r, mut out)| -> RecommenderResult<()> {
                    out.assign(&solve_row(interactions.row(r), fixed, &gram)?);
                    Ok(())
                })?;
        }
    }
    Ok(solved)
}

/// Closed-form solution for one row's factor vector
fn solve_row(
    row: SparseRow<'_>,
    fixed: &Array2<f64>,
    gram: &Array2<f64>,
) -> RecommenderResult<Array1<f64>> {
    let factors = fixed.ncols();
    if row.is_empty() {
        return Ok(Array1::zeros(factors));
    }

    let mut a = gram.clone();
    let mut b = Array1::<f64>::zeros(factors);
    for (col, confidence) in row.iter() {
        let c = confidence as f64;
        let y = fixed.row(col);
        for i in 0..factors {
            let scaled = (c - 1.0) * y[i];
            for j in 0..factors {
                a[[i, j]] += scaled * y[j];
            }
            b[i] += c * y[i];
        }
    }

    cholesky_solve(&a, &b)
}

/// Solves `a·x = b` for symmetric positive definite `a`
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> RecommenderResult<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return Err(RecommenderError::Training(
                        "normal equations are not positive definite; increase regularization"
                            .to_string(),
                    ));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Ok(x)
}

/// Full training objective, including the unobserved pairs
fn objective(
    user_items: &CsrMatrix,
    user_factors: &Array2<f64>,
    item_factors: &Array2<f64>,
    reg: f64,
) -> f64 {
    let gram = item_factors.t().dot(item_factors);
    let mut loss = 0.0;

    for (u, x) in user_factors.axis_iter(Axis(0)).enumerate() {
        // every item contributes (x·y)² as an unobserved pair
        loss += x.dot(&gram.dot(&x));
        for (i, confidence) in user_items.row(u).iter() {
            let c = confidence as f64;
            let s = x.dot(&item_factors.row(i));
            loss += c - 2.0 * c * s + (c - 1.0) * s * s;
        }
    }

    let norms = user_factors.iter().map(|v| v * v).sum::<f64>()
        + item_factors.iter().map(|v| v * v).sum::<f64>();
    loss + reg * norms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_matrix() -> CsrMatrix {
        // users 0-2 like items 0-2, users 3-5 like items 3-5; user 0 lacks item 2
        let mut entries = Vec::new();
        for u in 0..6 {
            let block = if u < 3 { 0..3 } else { 3..6 };
            for i in block {
                if !(u == 0 && i == 2) {
                    entries.push((u, i, 41.0));
                }
            }
        }
        CsrMatrix::from_triplets(6, 6, &entries, |a, b| a + b).unwrap()
    }

    fn params() -> AlsParams {
        AlsParams {
            factors: 4,
            regularization: 0.1,
            alpha: 40.0,
            iterations: 15,
            backend: ComputeBackend::Cpu,
            seed: 7,
        }
    }

    #[test]
    fn test_cholesky_solves_spd_system() {
        let a = Array2::from_shape_vec((2, 2), vec![4.0, 1.0, 1.0, 3.0]).unwrap();
        let b = Array1::from(vec![1.0, 2.0]);
        let x = cholesky_solve(&a, &b).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite_matrix() {
        let a = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let b = Array1::from(vec![1.0, 1.0]);
        assert!(matches!(cholesky_solve(&a, &b), Err(RecommenderError::Training(_))));
    }

    #[test]
    fn test_fit_runs_exact_iterations_and_shapes() {
        let train = block_matrix();
        let model = AlternatingLeastSquares::fit(params(), &train.transpose()).unwrap();
        assert_eq!(model.training_loss().len(), 15);
        assert_eq!(model.user_factors().shape(), &[6, 4]);
        assert_eq!(model.item_factors().shape(), &[6, 4]);
    }

    #[test]
    fn test_loss_does_not_increase() {
        let train = block_matrix();
        let model = AlternatingLeastSquares::fit(params(), &train.transpose()).unwrap();
        let loss = model.training_loss();
        for pair in loss.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-9) + 1e-9, "{:?}", loss);
        }
    }

    #[test]
    fn test_recommend_prefers_block_item_and_filters_seen() {
        let train = block_matrix();
        let model = AlternatingLeastSquares::fit(params(), &train.transpose()).unwrap();
        let recs = model.recommend(0, train.row(0), 2, true).unwrap();

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].0, 2);
        assert!(recs.iter().all(|(item, _)| !train.row(0).contains(*item)));

        let unfiltered = model.recommend(0, train.row(0), 6, false).unwrap();
        assert_eq!(unfiltered.len(), 6);
    }

    #[test]
    fn test_recommend_unknown_user_index() {
        let train = block_matrix();
        let model = AlternatingLeastSquares::fit(params(), &train.transpose()).unwrap();
        let result = model.recommend(6, train.row(6), 3, true);
        assert!(matches!(
            result,
            Err(RecommenderError::UserIndexOutOfRange { index: 6, len: 6 })
        ));
    }

    #[test]
    fn test_backends_agree() {
        let train = block_matrix();
        let cpu = AlternatingLeastSquares::fit(params(), &train.transpose()).unwrap();
        let threaded = AlternatingLeastSquares::fit(
            AlsParams {
                backend: ComputeBackend::Threaded,
                ..params()
            },
            &train.transpose(),
        )
        .unwrap();

        let users = cpu.user_factors().iter().zip(threaded.user_factors());
        let items = cpu.item_factors().iter().zip(threaded.item_factors());
        for (a, b) in users.chain(items) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_factors_rejected() {
        let train = block_matrix();
        let result = AlternatingLeastSquares::fit(
            AlsParams {
                factors: 0,
                ..params()
            },
            &train.transpose(),
        );
        assert!(matches!(result, Err(RecommenderError::InvalidParameter(_))));
    }

    #[test]
    fn test_backend_names() {
        let backend: ComputeBackend = serde_json::from_str("\"threaded\"").unwrap();
        assert_eq!(backend, ComputeBackend::Threaded);
        let name = serde_json::to_string(&ComputeBackend::Cpu).unwrap();
        assert_eq!(name, "\"cpu\"");
        assert!(serde_json::from_str::<ComputeBackend>("\"gpu\"").is_err());
    }
}
