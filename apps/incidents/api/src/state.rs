//! Application state management.
//!
//! Cloned into every router; the clones share the connection pool and the
//! embedding client.

use domain_incidents::EmbeddingProvider;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: crate::config::Config,
    /// PostgreSQL database connection pool
    pub db: database::postgres::DatabaseConnection,
    /// Client for the text embedding service
    pub embedder: Arc<dyn EmbeddingProvider>,
}
