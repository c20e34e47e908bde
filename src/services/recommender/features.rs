//! Item feature vectors (genres, release year, top tags) and content similarity.

use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::mapping::IdMapper;
use crate::error::{RecommenderError, RecommenderResult};
use crate::models::{Movie, MovieInfo, RawId, TagName, TagRelevance};

/// Number of highest-relevance tags kept per movie
pub const TOP_TAGS_PER_MOVIE: usize = 5;

/// Name of the single year column in the feature vocabulary
pub const YEAR_COLUMN: &str = "year";

/// Feature matrix over items, with named columns
///
/// Columns are laid out as `[genres..., year, tags...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub vocabulary: Vec<String>,
    pub genre_columns: usize,
    pub tag_columns: usize,
    pub values: Array2<f32>,
}

impl FeatureMatrix {
    pub fn dim(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn year_column(&self) -> usize {
        self.genre_columns
    }

    /// Column range holding the normalized tag weights
    pub fn tag_range(&self) -> std::ops::Range<usize> {
        let start = self.year_column() + 1;
        start..start + self.tag_columns
    }
}

/// Features for every movie in the catalog, in catalog order
#[derive(Debug, Clone)]
pub struct CatalogFeatures {
    pub features: FeatureMatrix,
    pub catalog: Vec<MovieInfo>,
    rows: HashMap<RawId, usize>,
}

impl CatalogFeatures {
    pub fn contains(&self, movie_id: RawId) -> bool {
        self.rows.contains_key(&movie_id)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Feature rows re-ordered to follow the item dense indices
    pub fn for_items(&self, items: &IdMapper) -> RecommenderResult<FeatureMatrix> {
        let dim = self.features.dim();
        let mut values = Array2::<f32>::zeros((items.len(), dim));
        for (index, &movie_id) in items.raw_ids().iter().enumerate() {
            let row = self
                .rows
                .get(&movie_id)
                .copied()
                .ok_or(RecommenderError::NotFoundItem(movie_id))?;
            values.row_mut(index).assign(&self.features.values.row(row));
        }

        Ok(FeatureMatrix {
            vocabulary: self.features.vocabulary.clone(),
            genre_columns: self.features.genre_columns,
            tag_columns: self.features.tag_columns,
            values,
        })
    }
}

/// Builds one feature vector per catalog movie
///
/// The genre and tag vocabularies are taken over the whole catalog, as are
/// the year statistics used for imputation and min-max scaling.
pub fn build_catalog_features(
    movies: &[Movie],
    tag_relevance: &[TagRelevance],
    tag_names: &[TagName],
) -> RecommenderResult<CatalogFeatures> {
    if movies.is_empty() {
        return Err(RecommenderError::Preprocessing("catalog is empty".to_string()));
    }

    let mut rows = HashMap::with_capacity(movies.len());
    for (row, movie) in movies.iter().enumerate() {
        if rows.insert(movie.movie_id, row).is_some() {
            return Err(RecommenderError::Preprocessing(format!(
                "movie {} appears twice in the catalog",
                movie.movie_id
            )));
        }
    }

    let years: Vec<Option<i32>> = movies.iter().map(Movie::year).collect();
    let normalized_years = normalize_years(&years);

    let genres_per_movie: Vec<Vec<String>> = movies.iter().map(Movie::genre_list).collect();
    let genre_vocabulary: Vec<String> = genres_per_movie
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let top_tags = select_top_tags(tag_relevance, tag_names, &rows)?;
    let tag_vocabulary: Vec<String> = top_tags
        .values()
        .flatten()
        .map(|(name, _)| name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if genre_vocabulary.is_empty() && tag_vocabulary.is_empty() {
        return Err(RecommenderError::Preprocessing(
            "feature vocabulary is empty: no genres or tags in the catalog".to_string(),
        ));
    }

    let genre_columns = genre_vocabulary.len();
    let tag_columns = tag_vocabulary.len();
    let year_column = genre_columns;
    let tag_offset = genre_columns + 1;

    let genre_index: HashMap<&str, usize> = genre_vocabulary
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_str(), i))
        .collect();
    let tag_index: HashMap<&str, usize> = tag_vocabulary
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let mut values = Array2::<f32>::zeros((movies.len(), genre_columns + 1 + tag_columns));
    let mut catalog = Vec::with_capacity(movies.len());

    for (row, movie) in movies.iter().enumerate() {
        for genre in &genres_per_movie[row] {
            if let Some(&col) = genre_index.get(genre.as_str()) {
                values[[row, col]] = 1.0;
            }
        }
        values[[row, year_column]] = normalized_years[row];

        let tags = top_tags.get(&movie.movie_id);
        if let Some(tags) = tags {
            let weights = normalize_tag_weights(tags);
            for ((name, _), weight) in tags.iter().zip(weights) {
                if let Some(&col) = tag_index.get(name.as_str()) {
                    let cell = &mut values[[row, tag_offset + col]];
                    // first occurrence wins when two tag ids share a name
                    if *cell == 0.0 {
                        *cell = weight;
                    }
                }
            }
        }

        catalog.push(MovieInfo {
            movie_id: movie.movie_id,
            title: movie.title.clone(),
            genres: genres_per_movie[row].clone(),
            year: years[row],
            top_tags: tags.filter(|t| !t.is_empty()).map(|t| {
                t.iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
        });
    }

    let mut vocabulary = genre_vocabulary;
    vocabulary.push(YEAR_COLUMN.to_string());
    vocabulary.extend(tag_vocabulary);

    tracing::info!(
        movies = movies.len(),
        genres = genre_columns,
        tags = tag_columns,
        movies_with_tags = top_tags.len(),
        movies_without_year = years.iter().filter(|y| y.is_none()).count(),
        "Catalog features built"
    );

    Ok(CatalogFeatures {
        features: FeatureMatrix {
            vocabulary,
            genre_columns,
            tag_columns,
            values,
        },
        catalog,
        rows,
    })
}

/// Imputes missing years with the mean of known ones, then min-max scales to `[0, 1]`
///
/// A catalog with no known years, or a single distinct year, scales to zeros.
pub fn normalize_years(years: &[Option<i32>]) -> Vec<f32> {
    let known: Vec<f64> = years.iter().flatten().map(|&y| y as f64).collect();
    if known.is_empty() {
        return vec![0.0; years.len()];
    }

    let mean = known.iter().sum::<f64>() / known.len() as f64;
    let filled: Vec<f64> = years
        .iter()
        .map(|y| y.map(|v| v as f64).unwrap_or(mean))
        .collect();
    let min = filled.iter().copied().fold(f64::INFINITY, f64::min);
    let max = filled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    filled
        .into_iter()
        .map(|y| {
            if range > 0.0 {
                ((y - min) / range) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Scales tag relevances by the movie's own maximum
///
/// A movie whose top relevances are all zero gets a zero vector.
pub fn normalize_tag_weights(tags: &[(String, f32)]) -> Vec<f32> {
    let max = tags.iter().map(|(_, r)| *r).fold(0.0f32, f32::max);
    tags.iter()
        .map(|(_, r)| if max > 0.0 { r / max } else { 0.0 })
        .collect()
}

/// Keeps the `TOP_TAGS_PER_MOVIE` most relevant named tags of each catalog movie
fn select_top_tags(
    tag_relevance: &[TagRelevance],
    tag_names: &[TagName],
    catalog_rows: &HashMap<RawId, usize>,
) -> RecommenderResult<HashMap<RawId, Vec<(String, f32)>>> {
    let names: HashMap<RawId, &str> = tag_names
        .iter()
        .map(|t| (t.tag_id, t.tag.as_str()))
        .collect();

    let mut per_movie: HashMap<RawId, Vec<(RawId, f32)>> = HashMap::new();
    for record in tag_relevance {
        if !record.relevance.is_finite() || !(0.0..=1.0).contains(&record.relevance) {
            return Err(RecommenderError::Preprocessing(format!(
                "tag {} on movie {} has relevance {} outside [0, 1]",
                record.tag_id, record.movie_id, record.relevance
            )));
        }
        if catalog_rows.contains_key(&record.movie_id) {
            per_movie
                .entry(record.movie_id)
                .or_default()
                .push((record.tag_id, record.relevance));
        }
    }

    let mut unnamed = 0usize;
    let top = per_movie
        .into_iter()
        .map(|(movie_id, mut tags)| {
            tags.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            tags.truncate(TOP_TAGS_PER_MOVIE);
            let named: Vec<(String, f32)> = tags
                .into_iter()
                .filter_map(|(tag_id, relevance)| match names.get(&tag_id) {
                    Some(name) => Some((name.to_string(), relevance)),
                    None => {
                        unnamed += 1;
                        None
                    }
                })
                .collect();
            (movie_id, named)
        })
        .collect();

    if unnamed > 0 {
        tracing::debug!(dropped = unnamed, "Top tags without a name were dropped");
    }

    Ok(top)
}

/// Pairwise cosine similarity between the rows of `features`
///
/// The result is exactly symmetric; all-zero rows are similar to nothing,
/// including themselves.
pub fn cosine_similarity(features: &Array2<f32>) -> Array2<f32> {
    let mut normalized = features.to_owned();
    for mut row in normalized.rows_mut() {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }

    let mut similarity = normalized.dot(&normalized.t());
    let n = similarity.nrows();
    for i in 0..n {
        similarity[[i, i]] = similarity[[i, i]].clamp(-1.0, 1.0);
        for j in (i + 1)..n {
            let value = similarity[[i, j]].clamp(-1.0, 1.0);
            similarity[[i, j]] = value;
            similarity[[j, i]] = value;
        }
    }
    similarity
}
