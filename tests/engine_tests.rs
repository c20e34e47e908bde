mod common;

use std::collections::HashSet;
use std::time::Duration;

use hybrid_recommender::error::RecommenderError;
use hybrid_recommender::models::Rating;
use hybrid_recommender::services::recommender::{
    build_catalog_features, build_interactions, explain::COLLABORATIVE_EXPLANATION, preprocess,
    IdMapper, PreprocessConfig, RecommenderEngine, SplitConfig, SplitPolicy,
};
use hybrid_recommender::services::storage::{self, LocalBlobStore};

#[test]
fn test_identifier_mapping_is_bijective() {
    let engine = common::engine();
    for mapper in [engine.users(), engine.items()] {
        let ids: HashSet<_> = mapper.raw_ids().iter().copied().collect();
        assert_eq!(ids.len(), mapper.len());
        for (index, &raw) in mapper.raw_ids().iter().enumerate() {
            assert_eq!(mapper.index_of(raw), Some(index));
            assert_eq!(mapper.raw_id(index), Some(raw));
        }
    }
}

#[test]
fn test_dimensions_agree() {
    let engine = common::engine();
    let users = engine.users().len();
    let items = engine.items().len();

    assert_eq!(engine.interactions().train.shape(), (users, items));
    assert_eq!(engine.interactions().test.shape(), (users, items));
    assert_eq!(engine.model().user_factors().nrows(), users);
    assert_eq!(engine.model().item_factors().nrows(), items);
    assert_eq!(engine.content_similarity().dim(), (items, items));
    assert_eq!(engine.features().values.nrows(), items);
    assert_eq!(engine.model().training_loss().len(), 10);
}

#[test]
fn test_content_similarity_is_symmetric() {
    let engine = common::engine();
    let sim = engine.content_similarity();
    for i in 0..sim.nrows() {
        for j in 0..sim.ncols() {
            assert_eq!(sim[[i, j]], sim[[j, i]]);
            assert!(sim[[i, j]] <= 1.0 + 1e-6);
        }
        if engine.features().values.row(i).iter().any(|&v| v != 0.0) {
            assert!((sim[[i, i]] - 1.0).abs() < 1e-5);
        }
    }
}

#[test]
fn test_recommendations_never_include_train_items() {
    let engine = common::engine();
    for &user in engine.users().raw_ids() {
        let u = engine.users().index_of(user).unwrap();
        let seen = engine.interactions().train.row(u);
        for n in [1, 3, 5, 10, 50] {
            let recs = engine.recommend_hybrid(user, n).unwrap();
            assert!(recs.len() <= n);
            for rec in &recs {
                let i = engine.items().index_of(rec.movie_id).unwrap();
                assert!(!seen.contains(i));
                assert!(rec.score > 0.0);
            }
            assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}

#[test]
fn test_unknown_user_is_not_found() {
    let engine = common::engine();
    assert!(matches!(
        engine.recommend_hybrid(999, 5),
        Err(RecommenderError::NotFoundUser(999))
    ));
    assert!(matches!(
        engine.explain(999, 1),
        Err(RecommenderError::NotFoundUser(999))
    ));
}

#[test]
fn test_explanations_are_never_empty() {
    let engine = common::engine();
    for &user in engine.users().raw_ids() {
        for rec in engine.recommend_hybrid(user, 3).unwrap() {
            let text = engine.explain(user, rec.movie_id).unwrap();
            assert!(!text.is_empty());
            if text != COLLABORATIVE_EXPLANATION {
                let title = &engine.movie_info(rec.movie_id).unwrap().title;
                assert!(text.contains(title.as_str()));
            }
        }
    }
}

#[test]
fn test_evaluation_metrics_are_bounded() {
    let engine = common::engine();
    let report = engine.evaluate(5).unwrap();
    assert!(report.users_evaluated > 0);
    for value in [report.precision, report.map, report.ndcg] {
        assert!((0.0..=1.0).contains(&value));
    }
    let map = report.as_map();
    assert!(map.contains_key("precision@5"));
    assert!(map.contains_key("map@5"));
    assert!(map.contains_key("ndcg@5"));
}

#[test]
fn test_snapshot_file_round_trip() {
    let engine = common::engine();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");

    engine.save(&path).unwrap();
    let restored = RecommenderEngine::load(&path).unwrap();

    assert_eq!(restored.info(), engine.info());
    for &user in engine.users().raw_ids() {
        assert_eq!(
            restored.recommend_hybrid(user, 5).unwrap(),
            engine.recommend_hybrid(user, 5).unwrap()
        );
    }
    assert_eq!(restored.evaluate(5).unwrap(), engine.evaluate(5).unwrap());
}

#[tokio::test]
async fn test_blob_store_round_trip() {
    let engine = common::engine();
    let dir = tempfile::tempdir().unwrap();
    let store = LocalBlobStore::new(dir.path());

    let key = "models/latest.bin";
    let timeout = Duration::from_secs(5);
    let saved = storage::save_remote(&store, key, &engine).await;
    assert!(saved.is_ok());
    let restored = storage::load_remote(&store, key, timeout).await.unwrap();
    assert_eq!(restored.snapshot_id(), engine.snapshot_id());

    let missing = storage::load_remote(&store, "absent.bin", timeout).await;
    assert!(matches!(missing, Err(RecommenderError::StorageFetch(_))));
}

#[test]
fn test_strict_split_rejects_single_rating_user() {
    let ratings = vec![
        Rating::new(1, 10, 4.0),
        Rating::new(1, 11, 3.0),
        Rating::new(2, 10, 5.0),
    ];
    let users = IdMapper::from_ids(ratings.iter().map(|r| r.user_id));
    let items = IdMapper::from_ids(ratings.iter().map(|r| r.movie_id));
    let config = SplitConfig {
        policy: SplitPolicy::Strict,
        ..SplitConfig::default()
    };

    let result = build_interactions(&ratings, &users, &items, 4.0, 40.0, &config);
    assert!(matches!(
        result,
        Err(RecommenderError::InsufficientDataForSplit {
            user_id: 2,
            ratings: 1,
        })
    ));
}

#[test]
fn test_default_policy_routes_single_rating_to_train() {
    let mut data = common::catalog();
    data.ratings.push(Rating::new(77, 9, 5.0));

    let prepared = preprocess(&data, &PreprocessConfig::default()).unwrap();
    let u = prepared.users.index_of(77).unwrap();
    assert_eq!(prepared.interactions.train.row(u).len(), 1);
    assert!(prepared.interactions.test.row(u).is_empty());
}

#[test]
fn test_zero_relevance_tags_give_zero_segment() {
    let data = common::catalog();
    let features =
        build_catalog_features(&data.movies, &data.tag_relevance, &data.tag_names).unwrap();
    let row = data.movies.iter().position(|m| m.movie_id == 10).unwrap();

    let tags = features.features.tag_range();
    let segment = features.features.values.row(row);
    let mut tag_weights = segment.iter().skip(tags.start).take(tags.len());
    assert!(tag_weights.all(|&v| v == 0.0));
    assert!(segment.iter().all(|v| v.is_finite()));
}
