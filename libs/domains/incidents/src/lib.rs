//! Incidents Domain
//!
//! Geotagged environmental incident reports with three search modes:
//! proximity (point + radius), area (polygon, bounding box or circle) and
//! semantic similarity over description embeddings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints, OpenAPI
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌───────────────────┐
//! │   Service   │ ──▶ │ EmbeddingProvider │  ← OpenAI-compatible /embeddings
//! └──────┬──────┘     └───────────────────┘
//!        │            validation, deadlines, optimistic updates
//! ┌──────▼──────┐
//! │ Repository  │  ← PostGIS + pgvector (or in-memory)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Incident, filters, search hits, geometry
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_incidents::{
//!     EmbeddingConfig, IncidentService, InMemoryIncidentRepository, OpenAIEmbeddingProvider,
//!     handlers,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = OpenAIEmbeddingProvider::new(EmbeddingConfig::new(
//!     "http://localhost:8081/v1",
//!     "sentence-transformers/all-MiniLM-L6-v2",
//!     384,
//! ))?;
//! let service = IncidentService::new(InMemoryIncidentRepository::new(), Arc::new(embedder));
//!
//! let router = handlers::router(service);
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod error;
pub mod geometry;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

pub use embedding::{Embedding, EmbeddingConfig, EmbeddingProvider, OpenAIEmbeddingProvider};
pub use error::{IncidentError, IncidentResult};
pub use geometry::{GeoPoint, SearchArea, SearchCircle, SearchPolygon};
pub use models::{
    AreaSearchRequest, CreateIncident, Incident, IncidentFilter, IncidentStatus, Page,
    ProximityHit, ReporterInfo, SimilarityHit, UpdateIncident,
};
pub use postgres::PgIncidentRepository;
pub use repository::{InMemoryIncidentRepository, IncidentRepository};
pub use service::IncidentService;
