use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::db::Cache;
use crate::services::recommender::RecommenderEngine;
use crate::services::storage::BlobStore;

/// The active engine, replaceable as a whole
///
/// Readers clone the inner `Arc` and release the lock immediately, so a
/// request keeps using the engine it started with even if a reload swaps
/// in a new one mid-flight.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<RwLock<Arc<RecommenderEngine>>>,
}

impl EngineHandle {
    pub fn new(engine: RecommenderEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(engine))),
        }
    }

    pub async fn current(&self) -> Arc<RecommenderEngine> {
        self.inner.read().await.clone()
    }

    /// Installs `engine` and returns the one it replaced
    pub async fn swap(&self, engine: RecommenderEngine) -> Arc<RecommenderEngine> {
        let mut guard = self.inner.write().await;
        std::mem::replace(&mut *guard, Arc::new(engine))
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub cache: Option<Cache>,
    pub blob_store: Option<Arc<dyn BlobStore>>,
    pub snapshot_key: String,
    pub storage_timeout: Duration,
    pub cors_origin: Option<String>,
}

impl AppState {
    pub fn new(engine: RecommenderEngine) -> Self {
        Self {
            engine: EngineHandle::new(engine),
            cache: None,
            blob_store: None,
            snapshot_key: "recommendation_model.bin".to_string(),
            storage_timeout: Duration::from_secs(30),
            cors_origin: None,
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_blob_store(
        mut self,
        store: Arc<dyn BlobStore>,
        snapshot_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.blob_store = Some(store);
        self.snapshot_key = snapshot_key.into();
        self.storage_timeout = timeout;
        self
    }

    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = Some(origin.into());
        self
    }
}
