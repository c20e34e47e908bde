mod movie;
mod recommendation;

pub use movie::{extract_year, CatalogData, Movie, MovieInfo, Rating, TagName, TagRelevance};
pub use recommendation::{EvaluationReport, Recommendation, SnapshotInfo};

/// Identifier of a user or movie as supplied by the catalog data source
pub type RawId = i64;
