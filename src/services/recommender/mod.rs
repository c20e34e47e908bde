//! Hybrid recommendation engine.
//!
//! Collaborative scores come from an implicit-feedback ALS model over the
//! train interaction matrix; content scores come from cosine similarity of
//! genre, year and tag features. [`RecommenderEngine`] owns the whole
//! trained state and is read-only once built.

pub mod als;
pub mod evaluation;
pub mod explain;
pub mod features;
pub mod hybrid;
pub mod interactions;
pub mod mapping;
pub mod snapshot;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use uuid::Uuid;

use crate::error::{RecommenderError, RecommenderResult};
use crate::models::{
    CatalogData, EvaluationReport, MovieInfo, RawId, Rating, Recommendation, SnapshotInfo,
};

pub use als::{AlsParams, AlternatingLeastSquares, ComputeBackend};
pub use features::{build_catalog_features, cosine_similarity, FeatureMatrix};
pub use interactions::{
    build_interactions, CsrMatrix, InteractionMatrices, SplitConfig, SplitPolicy,
};
pub use mapping::IdMapper;
pub use snapshot::Snapshot;

/// Settings for turning raw catalog data into model inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    /// Held-out ratings at or above this count as relevant
    pub rating_threshold: f32,
    /// Confidence scaling, `1 + alpha * rating / 5`
    pub alpha: f32,
    pub split: SplitConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            rating_threshold: 4.0,
            alpha: AlsParams::default().alpha,
            split: SplitConfig::default(),
        }
    }
}

/// Everything training needs, produced by [`preprocess`]
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub users: IdMapper,
    pub items: IdMapper,
    pub features: FeatureMatrix,
    pub similarity: Array2<f32>,
    pub catalog: Vec<MovieInfo>,
    pub interactions: InteractionMatrices,
    pub rating_threshold: f32,
}

/// Builds features, identifier mappings, the split and both matrices
///
/// Ratings for movies absent from the catalog are dropped. Users and items
/// get dense indices in order of first appearance among the kept ratings.
pub fn preprocess(
    data: &CatalogData,
    config: &PreprocessConfig,
) -> RecommenderResult<PreparedData> {
    let catalog_features =
        build_catalog_features(&data.movies, &data.tag_relevance, &data.tag_names)?;

    if let Some(bad) = data
        .ratings
        .iter()
        .find(|r| !r.rating.is_finite() || !(0.0..=5.0).contains(&r.rating))
    {
        return Err(RecommenderError::Preprocessing(format!(
            "rating {} by user {} for movie {} is outside 0..=5",
            bad.rating, bad.user_id, bad.movie_id
        )));
    }

    let ratings: Vec<Rating> = data
        .ratings
        .iter()
        .filter(|r| catalog_features.contains(r.movie_id))
        .copied()
        .collect();
    let dropped = data.ratings.len() - ratings.len();
    if dropped > 0 {
        tracing::warn!(
            dropped,
            "Ignoring ratings for movies missing from the catalog"
        );
    }
    if ratings.is_empty() {
        return Err(RecommenderError::Preprocessing(
            "no ratings reference catalog movies".to_string(),
        ));
    }

    let users = IdMapper::from_ids(ratings.iter().map(|r| r.user_id));
    let items = IdMapper::from_ids(ratings.iter().map(|r| r.movie_id));

    let interactions = build_interactions(
        &ratings,
        &users,
        &items,
        config.rating_threshold,
        config.alpha,
        &config.split,
    )?;

    let features = catalog_features.for_items(&items)?;
    let similarity = cosine_similarity(&features.values);

    tracing::info!(
        users = users.len(),
        items = items.len(),
        catalog = catalog_features.len(),
        feature_dim = features.dim(),
        "Preprocessing complete"
    );

    Ok(PreparedData {
        users,
        items,
        features,
        similarity,
        catalog: catalog_features.catalog,
        interactions,
        rating_threshold: config.rating_threshold,
    })
}

/// A trained, immutable recommender
#[derive(Debug, Clone)]
pub struct RecommenderEngine {
    snapshot_id: Uuid,
    trained_at: DateTime<Utc>,
    content_weight: f32,
    rating_threshold: f32,
    users: IdMapper,
    items: IdMapper,
    features: FeatureMatrix,
    similarity: Array2<f32>,
    catalog: Vec<MovieInfo>,
    catalog_index: HashMap<RawId, usize>,
    interactions: InteractionMatrices,
    model: AlternatingLeastSquares,
}

impl RecommenderEngine {
    /// Fits the collaborative model on the prepared train matrix
    pub fn train(
        prepared: PreparedData,
        params: AlsParams,
        content_weight: f32,
    ) -> RecommenderResult<Self> {
        if !(0.0..=1.0).contains(&content_weight) {
            return Err(RecommenderError::InvalidParameter(format!(
                "content weight must be in [0, 1], got {}",
                content_weight
            )));
        }

        let model = AlternatingLeastSquares::fit(params, &prepared.interactions.train.transpose())?;
        let catalog_index = index_catalog(&prepared.catalog);

        Ok(Self {
            snapshot_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            content_weight,
            rating_threshold: prepared.rating_threshold,
            users: prepared.users,
            items: prepared.items,
            features: prepared.features,
            similarity: prepared.similarity,
            catalog: prepared.catalog,
            catalog_index,
            interactions: prepared.interactions,
            model,
        })
    }

    /// Top `n` unseen movies for a user, fusing collaborative and content scores
    ///
    /// Fewer than `n` results are returned when not enough movies score above zero.
    pub fn recommend_hybrid(
        &self,
        user_id: RawId,
        n: usize,
    ) -> RecommenderResult<Vec<Recommendation>> {
        let user = self.user_index(user_id)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        let fetch = n.saturating_mul(hybrid::CANDIDATE_MULTIPLIER);
        let seen = self.interactions.train.row(user);

        let candidates = self.model.recommend(user, seen, fetch, true)?;
        let cf = hybrid::collaborative_scores(&candidates, self.items.len());

        let favorites = hybrid::favorites(seen, hybrid::FAVORITE_COUNT);
        let content = hybrid::content_scores(&self.similarity, &favorites, fetch);

        let mut scores = hybrid::fuse(&cf, &content, self.content_weight);
        hybrid::exclude_seen(&mut scores, seen);

        hybrid::top_positive(&scores, n)
            .into_iter()
            .map(|(index, score)| -> RecommenderResult<Recommendation> {
                let movie_id = self.item_raw_id(index)?;
                Ok(Recommendation { movie_id, score })
            })
            .collect()
    }

    /// Why `movie_id` suits `user_id`, citing the closest favorite when possible
    pub fn explain(&self, user_id: RawId, movie_id: RawId) -> RecommenderResult<String> {
        let user = self.user_index(user_id)?;
        let item = self
            .items
            .index_of(movie_id)
            .ok_or(RecommenderError::NotFoundItem(movie_id))?;

        let history = self.interactions.train.row(user);
        let favorites = hybrid::favorites(history, hybrid::FAVORITE_COUNT);
        let closest = explain::closest_favorite(&self.similarity, item, &favorites);
        let Some((favorite, similarity)) = closest else {
            return Ok(explain::COLLABORATIVE_EXPLANATION.to_string());
        };

        let favorite_id = self.item_raw_id(favorite)?;
        let target = self.movie_info(movie_id)?;
        let liked = self.movie_info(favorite_id)?;

        tracing::debug!(
            user_id,
            movie_id,
            favorite_id,
            similarity,
            "Content explanation"
        );
        Ok(explain::compose(target, liked))
    }

    /// Ranking quality of the collaborative model on held-out ratings
    pub fn evaluate(&self, k: usize) -> RecommenderResult<EvaluationReport> {
        evaluation::evaluate(
            &self.model,
            &self.interactions.train,
            &self.interactions.test,
            k,
        )
    }

    pub fn movie_info(&self, movie_id: RawId) -> RecommenderResult<&MovieInfo> {
        self.catalog_index
            .get(&movie_id)
            .map(|&row| &self.catalog[row])
            .ok_or(RecommenderError::NotFoundItem(movie_id))
    }

    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            snapshot_id: self.snapshot_id,
            trained_at: self.trained_at,
            users: self.users.len(),
            movies: self.items.len(),
            factors: self.model.params().factors,
            content_weight: self.content_weight,
            final_training_loss: self.model.training_loss().last().copied(),
        }
    }

    pub fn snapshot_id(&self) -> Uuid {
        self.snapshot_id
    }

    pub fn content_weight(&self) -> f32 {
        self.content_weight
    }

    pub fn users(&self) -> &IdMapper {
        &self.users
    }

    pub fn items(&self) -> &IdMapper {
        &self.items
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    /// Item-by-item cosine similarity, indexed by dense item index
    pub fn content_similarity(&self) -> &Array2<f32> {
        &self.similarity
    }

    pub fn interactions(&self) -> &InteractionMatrices {
        &self.interactions
    }

    pub fn model(&self) -> &AlternatingLeastSquares {
        &self.model
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            snapshot_id: self.snapshot_id,
            trained_at: self.trained_at,
            params: *self.model.params(),
            content_weight: self.content_weight,
            rating_threshold: self.rating_threshold,
            users: self.users.clone(),
            items: self.items.clone(),
            features: self.features.clone(),
            similarity: self.similarity.clone(),
            catalog: self.catalog.clone(),
            train: self.interactions.train.clone(),
            test: self.interactions.test.clone(),
            user_factors: self.model.user_factors().clone(),
            item_factors: self.model.item_factors().clone(),
            training_loss: self.model.training_loss().to_vec(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> RecommenderResult<Self> {
        let model = AlternatingLeastSquares::from_parts(
            snapshot.params,
            snapshot.user_factors,
            snapshot.item_factors,
            snapshot.training_loss,
        )?;
        let catalog_index = index_catalog(&snapshot.catalog);

        Ok(Self {
            snapshot_id: snapshot.snapshot_id,
            trained_at: snapshot.trained_at,
            content_weight: snapshot.content_weight,
            rating_threshold: snapshot.rating_threshold,
            users: snapshot.users,
            items: snapshot.items,
            features: snapshot.features,
            similarity: snapshot.similarity,
            catalog: snapshot.catalog,
            catalog_index,
            interactions: InteractionMatrices {
                train: snapshot.train,
                test: snapshot.test,
            },
            model,
        })
    }

    pub fn to_bytes(&self) -> RecommenderResult<Vec<u8>> {
        self.to_snapshot().to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> RecommenderResult<Self> {
        Self::from_snapshot(Snapshot::from_bytes(bytes)?)
    }

    pub fn save(&self, path: &Path) -> RecommenderResult<()> {
        self.to_snapshot().save(path)
    }

    pub fn load(path: &Path) -> RecommenderResult<Self> {
        let engine = Self::from_snapshot(Snapshot::load(path)?)?;
        tracing::info!(
            path = %path.display(),
            snapshot_id = %engine.snapshot_id,
            "Snapshot loaded"
        );
        Ok(engine)
    }

    fn user_index(&self, user_id: RawId) -> RecommenderResult<usize> {
        self.users
            .index_of(user_id)
            .ok_or(RecommenderError::NotFoundUser(user_id))
    }

    /// Raw id behind a dense index produced by this engine's own matrices
    fn item_raw_id(&self, index: usize) -> RecommenderResult<RawId> {
        self.items.raw_id(index).ok_or_else(|| {
            RecommenderError::Training(format!("item index {} has no raw id", index))
        })
    }
}

fn index_catalog(catalog: &[MovieInfo]) -> HashMap<RawId, usize> {
    catalog
        .iter()
        .enumerate()
        .map(|(row, movie)| (movie.movie_id, row))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Movie, TagName, TagRelevance};

    fn data() -> CatalogData {
        CatalogData {
            movies: vec![
                Movie::new(1, "Toy Story (1995)", "Adventure|Animation|Children"),
                Movie::new(2, "Heat (1995)", "Action|Crime|Thriller"),
                Movie::new(3, "Up (2009)", "Adventure|Animation|Drama"),
                Movie::new(4, "Ronin (1998)", "Action|Crime|Thriller"),
                Movie::new(5, "Unrated Film", "Drama"),
            ],
            tag_relevance: vec![
                TagRelevance::new(1, 1, 0.9),
                TagRelevance::new(3, 1, 0.8),
                TagRelevance::new(2, 2, 0.7),
            ],
            tag_names: vec![
                TagName::new(1, "pixar"),
                TagName::new(2, "heist"),
            ],
            ratings: vec![
                Rating::new(10, 1, 5.0),
                Rating::new(10, 2, 1.0),
                Rating::new(10, 3, 4.5),
                Rating::new(20, 2, 5.0),
                Rating::new(20, 4, 4.0),
                Rating::new(20, 1, 2.0),
                Rating::new(30, 3, 4.0),
                Rating::new(30, 4, 3.0),
                Rating::new(30, 99, 5.0),
            ],
        }
    }

    fn engine() -> RecommenderEngine {
        let prepared = preprocess(&data(), &PreprocessConfig::default()).unwrap();
        let params = AlsParams {
            factors: 3,
            iterations: 5,
            ..AlsParams::default()
        };
        RecommenderEngine::train(prepared, params, 0.25).unwrap()
    }

    #[test]
    fn test_preprocess_drops_unknown_movies() {
        let prepared = preprocess(&data(), &PreprocessConfig::default()).unwrap();
        assert_eq!(prepared.users.raw_ids(), &[10, 20, 30]);
        assert_eq!(prepared.items.raw_ids(), &[1, 2, 3, 4]);
        assert!(prepared.items.index_of(99).is_none());
        assert_eq!(prepared.similarity.dim(), (4, 4));
        assert_eq!(prepared.catalog.len(), 5);
    }

    #[test]
    fn test_preprocess_rejects_out_of_scale_rating() {
        let mut data = data();
        data.ratings.push(Rating::new(10, 4, 7.5));
        let err = preprocess(&data, &PreprocessConfig::default()).unwrap_err();
        assert!(matches!(err, RecommenderError::Preprocessing(_)));
    }

    #[test]
    fn test_preprocess_rejects_ratings_outside_catalog() {
        let mut data = data();
        data.ratings = vec![Rating::new(10, 99, 5.0), Rating::new(10, 98, 3.0)];
        let err = preprocess(&data, &PreprocessConfig::default()).unwrap_err();
        assert!(matches!(err, RecommenderError::Preprocessing(_)));
    }

    #[test]
    fn test_train_rejects_content_weight() {
        let prepared = preprocess(&data(), &PreprocessConfig::default()).unwrap();
        let err = RecommenderEngine::train(prepared, AlsParams::default(), 1.5).unwrap_err();
        assert!(matches!(err, RecommenderError::InvalidParameter(_)));
    }

    #[test]
    fn test_recommendations_exclude_train_items() {
        let engine = engine();
        for &user in engine.users().raw_ids() {
            let u = engine.users().index_of(user).unwrap();
            let seen = engine.interactions().train.row(u);
            for rec in engine.recommend_hybrid(user, 10).unwrap() {
                let i = engine.items().index_of(rec.movie_id).unwrap();
                assert!(!seen.contains(i));
                assert!(rec.score > 0.0);
            }
        }
        assert!(engine.recommend_hybrid(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_ids() {
        let engine = engine();
        assert!(matches!(
            engine.recommend_hybrid(404, 5),
            Err(RecommenderError::NotFoundUser(404))
        ));
        assert!(matches!(
            engine.explain(404, 1),
            Err(RecommenderError::NotFoundUser(404))
        ));
        assert!(matches!(
            engine.explain(10, 404),
            Err(RecommenderError::NotFoundItem(404))
        ));
        assert!(matches!(
            engine.movie_info(404),
            Err(RecommenderError::NotFoundItem(404))
        ));
    }

    #[test]
    fn test_movie_info_covers_unrated_catalog_movies() {
        let engine = engine();
        let info = engine.movie_info(5).unwrap();
        assert_eq!(info.title, "Unrated Film");
        assert_eq!(info.year, None);
    }

    #[test]
    fn test_bytes_round_trip_preserves_outputs() {
        let engine = engine();
        let restored = RecommenderEngine::from_bytes(&engine.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.snapshot_id(), engine.snapshot_id());
        assert_eq!(restored.info(), engine.info());
        for &user in engine.users().raw_ids() {
            assert_eq!(
                restored.recommend_hybrid(user, 3).unwrap(),
                engine.recommend_hybrid(user, 3).unwrap()
            );
        }
    }

    #[test]
    fn test_info_reports_dimensions() {
        let info = engine().info();
        assert_eq!(info.users, 3);
        assert_eq!(info.movies, 4);
        assert_eq!(info.factors, 3);
        assert!(info.final_training_loss.is_some());
    }

    #[test]
    fn test_dangling_item_index_is_internal_error() {
        let engine = engine();
        let result = engine.item_raw_id(engine.items().len());
        assert!(matches!(result, Err(RecommenderError::Training(_))));
        assert_eq!(engine.item_raw_id(0).unwrap(), engine.items().raw_ids()[0]);
    }
}
