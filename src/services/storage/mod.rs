/// Snapshot blob storage
///
/// A trained engine is persisted as one named binary object. Backends are
/// pluggable behind [`BlobStore`]; the server only ever needs `get`, the
/// training binary also uses `put`.
use std::time::Duration;

use crate::{
    error::{RecommenderError, RecommenderResult},
    services::recommender::RecommenderEngine,
};

pub mod http;
pub mod local;

pub use http::HttpBlobStore;
pub use local::LocalBlobStore;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Object {0} not found")]
    NotFound(String),

    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Named binary object storage
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the full contents of `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `bytes` under `key`, replacing any previous object
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Fetches and decodes a snapshot, failing with `StorageFetch` once `timeout` elapses
pub async fn load_remote(
    store: &dyn BlobStore,
    key: &str,
    timeout: Duration,
) -> RecommenderResult<RecommenderEngine> {
    let bytes = match tokio::time::timeout(timeout, store.get(key)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            tracing::error!(store = store.name(), key, error = %e, "Snapshot fetch failed");
            return Err(RecommenderError::StorageFetch(e.to_string()));
        }
        Err(_) => {
            tracing::error!(store = store.name(), key, ?timeout, "Snapshot fetch timed out");
            return Err(RecommenderError::StorageFetch(format!(
                "fetching {} timed out after {:?}",
                key, timeout
            )));
        }
    };

    let size = bytes.len();
    // decoding a large snapshot is CPU-bound
    let engine = tokio::task::spawn_blocking(move || RecommenderEngine::from_bytes(&bytes))
        .await
        .map_err(|e| RecommenderError::Serialization(e.to_string()))??;

    tracing::info!(
        store = store.name(),
        key,
        bytes = size,
        snapshot_id = %engine.snapshot_id(),
        "Snapshot loaded from blob store"
    );
    Ok(engine)
}

/// Encodes and uploads a snapshot
pub async fn save_remote(
    store: &dyn BlobStore,
    key: &str,
    engine: &RecommenderEngine,
) -> RecommenderResult<()> {
    let bytes = engine.to_bytes()?;
    let size = bytes.len();
    store
        .put(key, bytes)
        .await
        .map_err(|e| RecommenderError::StorageFetch(e.to_string()))?;

    tracing::info!(store = store.name(), key, bytes = size, "Snapshot uploaded");
    Ok(())
}
