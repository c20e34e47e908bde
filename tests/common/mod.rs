#![allow(dead_code)]

use hybrid_recommender::models::{CatalogData, Movie, Rating, TagName, TagRelevance};
use hybrid_recommender::services::recommender::{
    preprocess, AlsParams, ComputeBackend, PreprocessConfig, RecommenderEngine,
};

/// Two taste clusters (action/crime and animation/family) plus one drama
pub fn catalog() -> CatalogData {
    let movies = vec![
        Movie::new(1, "Heat (1995)", "Action|Crime|Thriller"),
        Movie::new(2, "Ronin (1998)", "Action|Crime|Thriller"),
        Movie::new(3, "Collateral (2004)", "Action|Crime|Drama|Thriller"),
        Movie::new(4, "Drive (2011)", "Crime|Drama"),
        Movie::new(5, "Toy Story (1995)", "Adventure|Animation|Children|Comedy"),
        Movie::new(6, "Up (2009)", "Adventure|Animation|Drama"),
        Movie::new(7, "Coco (2017)", "Adventure|Animation|Children"),
        Movie::new(8, "Paddington (2014)", "Children|Comedy"),
        Movie::new(9, "Moonlight (2016)", "Drama"),
        Movie::new(10, "Lost Reel", "(no genres listed)"),
    ];

    let tag_names = vec![
        TagName::new(1, "heist"),
        TagName::new(2, "pixar"),
        TagName::new(3, "los angeles"),
        TagName::new(4, "family"),
        TagName::new(5, "obscure"),
    ];

    let scores: [(i64, i64, f32); 12] = [
        (1, 1, 0.95),
        (1, 3, 0.8),
        (2, 1, 0.7),
        (3, 3, 0.9),
        (4, 3, 0.6),
        (5, 2, 0.98),
        (5, 4, 0.7),
        (6, 2, 0.9),
        (7, 2, 0.85),
        (7, 4, 0.6),
        (8, 4, 0.9),
        (10, 5, 0.0),
    ];
    let tag_relevance = scores
        .iter()
        .map(|&(movie_id, tag_id, relevance)| TagRelevance::new(movie_id, tag_id, relevance))
        .collect();

    let liked_by_cluster = [[1i64, 2, 3, 4], [5, 6, 7, 8]];
    let mut ratings = Vec::new();
    for user in 1..=10i64 {
        let cluster = ((user - 1) % 2) as usize;
        let favorites = liked_by_cluster[cluster];
        let others = liked_by_cluster[1 - cluster];
        // each user rates three of their cluster and one of the other
        for offset in 0..3 {
            let movie = favorites[((user as usize) + offset) % favorites.len()];
            ratings.push(Rating::new(user, movie, 4.0 + (offset % 2) as f32));
        }
        let disliked = others[(user as usize) % others.len()];
        ratings.push(Rating::new(user, disliked, 1.5));
        if user % 3 == 0 {
            ratings.push(Rating::new(user, 9, 3.5));
        }
    }

    CatalogData {
        movies,
        tag_relevance,
        tag_names,
        ratings,
    }
}

pub fn params() -> AlsParams {
    AlsParams {
        factors: 8,
        regularization: 0.05,
        alpha: 40.0,
        iterations: 10,
        backend: ComputeBackend::Cpu,
        seed: 7,
    }
}

pub fn engine() -> RecommenderEngine {
    let prepared = preprocess(&catalog(), &PreprocessConfig::default()).expect("preprocess");
    RecommenderEngine::train(prepared, params(), 0.25).expect("train")
}
