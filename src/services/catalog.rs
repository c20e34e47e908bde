/// Catalog and rating data sources
///
/// Training reads four tables: movies, tag relevance scores, tag names and
/// ratings. Postgres is the production source (see `db::postgres`); the
/// in-memory source serves tests and offline tooling.
use crate::{
    error::AppResult,
    models::{CatalogData, Movie, Rating, TagName, TagRelevance},
};

#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    async fn movies(&self) -> AppResult<Vec<Movie>>;

    async fn tag_relevance(&self) -> AppResult<Vec<TagRelevance>>;

    async fn tag_names(&self) -> AppResult<Vec<TagName>>;

    async fn ratings(&self) -> AppResult<Vec<Rating>>;

    /// Loads every table concurrently
    async fn load_all(&self) -> AppResult<CatalogData> {
        let (movies, tag_relevance, tag_names, ratings) = tokio::try_join!(
            self.movies(),
            self.tag_relevance(),
            self.tag_names(),
            self.ratings()
        )?;

        tracing::info!(
            source = self.name(),
            movies = movies.len(),
            tag_scores = tag_relevance.len(),
            tags = tag_names.len(),
            ratings = ratings.len(),
            "Catalog data loaded"
        );

        Ok(CatalogData {
            movies,
            tag_relevance,
            tag_names,
            ratings,
        })
    }

    fn name(&self) -> &'static str;
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    data: CatalogData,
}

impl InMemoryCatalog {
    pub fn new(data: CatalogData) -> Self {
        Self { data }
    }
}

#[async_trait::async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn movies(&self) -> AppResult<Vec<Movie>> {
        Ok(self.data.movies.clone())
    }

    async fn tag_relevance(&self) -> AppResult<Vec<TagRelevance>> {
        Ok(self.data.tag_relevance.clone())
    }

    async fn tag_names(&self) -> AppResult<Vec<TagName>> {
        Ok(self.data.tag_names.clone())
    }

    async fn ratings(&self) -> AppResult<Vec<Rating>> {
        Ok(self.data.ratings.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
