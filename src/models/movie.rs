use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RawId;

/// Four-digit year in a trailing parenthesized group, e.g. `Heat (1995)`
static TRAILING_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((\d{4})\)\s*$").expect("trailing year pattern is valid")
});

/// Catalog record as stored by the catalog data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Movie {
    pub movie_id: RawId,
    pub title: String,
    /// `|`-delimited genre list, e.g. `Action|Crime|Thriller`
    pub genres: String,
}

impl Movie {
    pub fn new(movie_id: RawId, title: impl Into<String>, genres: impl Into<String>) -> Self {
        Self {
            movie_id,
            title: title.into(),
            genres: genres.into(),
        }
    }

    /// Genre tokens in catalog order, with blanks dropped
    pub fn genre_list(&self) -> Vec<String> {
        self.genres
            .split('|')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Release year taken from the title, if present
    pub fn year(&self) -> Option<i32> {
        extract_year(&self.title)
    }
}

/// Extracts a four-digit year from a trailing `(YYYY)` group in a title
pub fn extract_year(title: &str) -> Option<i32> {
    TRAILING_YEAR
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One explicit rating given by a user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Rating {
    pub user_id: RawId,
    pub movie_id: RawId,
    pub rating: f32,
}

impl Rating {
    pub fn new(user_id: RawId, movie_id: RawId, rating: f32) -> Self {
        Self {
            user_id,
            movie_id,
            rating,
        }
    }
}

/// Relevance of one tag to one movie, in `[0, 1]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct TagRelevance {
    pub movie_id: RawId,
    pub tag_id: RawId,
    pub relevance: f32,
}

impl TagRelevance {
    pub fn new(movie_id: RawId, tag_id: RawId, relevance: f32) -> Self {
        Self {
            movie_id,
            tag_id,
            relevance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct TagName {
    pub tag_id: RawId,
    pub tag: String,
}

impl TagName {
    pub fn new(tag_id: RawId, tag: impl Into<String>) -> Self {
        Self {
            tag_id,
            tag: tag.into(),
        }
    }
}

/// Everything a preprocessing run reads from the catalog data source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    pub movies: Vec<Movie>,
    pub tag_relevance: Vec<TagRelevance>,
    pub tag_names: Vec<TagName>,
    pub ratings: Vec<Rating>,
}

/// Enriched catalog entry kept inside a trained snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieInfo {
    pub movie_id: RawId,
    pub title: String,
    pub genres: Vec<String>,
    pub year: Option<i32>,
    /// Top tags joined by spaces, highest relevance first
    pub top_tags: Option<String>,
}
