use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    error::AppResult,
    models::{Movie, Rating, TagName, TagRelevance},
    services::catalog::CatalogSource,
};

/// Creates a PostgreSQL connection pool
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Reads the MovieLens-style tables: `movie`, `rating`, `genome_scores`, `genome_tags`
#[derive(Clone)]
pub struct PgCatalogSource {
    pool: PgPool,
}

impl PgCatalogSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogSource for PgCatalogSource {
    async fn movies(&self) -> AppResult<Vec<Movie>> {
        let movies = sqlx::query_as::<_, Movie>(
            r#"
            SELECT movie_id::bigint AS movie_id, title, genres
            FROM movie
            ORDER BY movie_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(movies)
    }

    async fn tag_relevance(&self) -> AppResult<Vec<TagRelevance>> {
        let scores = sqlx::query_as::<_, TagRelevance>(
            r#"
            SELECT movie_id::bigint AS movie_id, tag_id::bigint AS tag_id, relevance::real AS relevance
            FROM genome_scores
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(scores)
    }

    async fn tag_names(&self) -> AppResult<Vec<TagName>> {
        let tags = sqlx::query_as::<_, TagName>(
            r#"
            SELECT tag_id::bigint AS tag_id, tag
            FROM genome_tags
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    async fn ratings(&self) -> AppResult<Vec<Rating>> {
        // rating order feeds identifier assignment, so keep it stable
        let ratings = sqlx::query_as::<_, Rating>(
            r#"
            SELECT user_id::bigint AS user_id, movie_id::bigint AS movie_id, rating::real AS rating
            FROM rating
            ORDER BY user_id, movie_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
