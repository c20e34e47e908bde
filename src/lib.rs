//! Hybrid movie recommender: implicit-feedback ALS fused with content
//! similarity, served over HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
