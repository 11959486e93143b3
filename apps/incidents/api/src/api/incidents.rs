use axum::Router;
use domain_incidents::{IncidentService, PgIncidentRepository, handlers};

pub fn router(state: &crate::state::AppState) -> Router {
    let repository = PgIncidentRepository::new(state.db.clone());
    let service = IncidentService::new(repository, state.embedder.clone())
        .with_storage_timeout(state.config.storage_timeout)
        .with_embedding_timeout(state.config.embedding.timeout);
    handlers::router(service)
}
