use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::RawId;

/// Errors raised by the recommendation engine itself
///
/// Lookup, split, preprocessing, training and snapshot failures are kept
/// distinct so the request layer can map each one to its own response.
#[derive(thiserror::Error, Debug)]
pub enum RecommenderError {
    #[error("User {0} not found")]
    NotFoundUser(RawId),

    #[error("Movie {0} not found")]
    NotFoundItem(RawId),

    #[error("User index {index} is out of range for {len} users")]
    UserIndexOutOfRange { index: usize, len: usize },

    #[error("User {user_id} has {ratings} rating(s); a stratified split needs at least 2")]
    InsufficientDataForSplit { user_id: RawId, ratings: usize },

    #[error("Preprocessing error: {0}")]
    Preprocessing(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Snapshot serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot storage fetch error: {0}")]
    StorageFetch(String),
}

impl RecommenderError {
    /// Whether the error means an identifier or index was never observed
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RecommenderError::NotFoundUser(_)
                | RecommenderError::NotFoundItem(_)
                | RecommenderError::UserIndexOutOfRange { .. }
        )
    }
}

impl From<bincode::Error> for RecommenderError {
    fn from(err: bincode::Error) -> Self {
        RecommenderError::Serialization(err.to_string())
    }
}

pub type RecommenderResult<T> = Result<T, RecommenderError>;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Recommender(#[from] RecommenderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Recommender(err) => match err {
                e if e.is_not_found() => StatusCode::NOT_FOUND,
                RecommenderError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
                RecommenderError::InsufficientDataForSplit { .. }
                | RecommenderError::Preprocessing(_)
                | RecommenderError::Training(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RecommenderError::StorageFetch(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::InvalidInput(msg) | AppError::ServiceUnavailable(msg) => msg,
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds_map_to_404() {
        let err = AppError::from(RecommenderError::NotFoundUser(7));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = AppError::from(RecommenderError::NotFoundItem(3));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = AppError::from(RecommenderError::UserIndexOutOfRange { index: 9, len: 2 });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_storage_and_serialization_are_distinct() {
        let fetch = AppError::from(RecommenderError::StorageFetch("timeout".into()));
        let decode = AppError::from(RecommenderError::Serialization("bad magic".into()));
        assert_eq!(fetch.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(decode.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_split_error_message_names_user() {
        let err = RecommenderError::InsufficientDataForSplit {
            user_id: 42,
            ratings: 1,
        };
        assert!(err.to_string().contains("User 42"));
        assert!(!err.is_not_found());
    }
}
