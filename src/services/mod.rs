pub mod catalog;
pub mod recommender;
pub mod storage;
pub mod training;

pub use catalog::{CatalogSource, InMemoryCatalog};
pub use recommender::{preprocess, PreprocessConfig, RecommenderEngine};
pub use storage::{BlobStore, HttpBlobStore, LocalBlobStore};
pub use training::{train_from_source, TrainingConfig};
