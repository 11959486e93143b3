use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use sea_orm::{DbErr, RuntimeErr, sqlx};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Incident not found: {0}")]
    NotFound(Uuid),

    #[error("Incident {0} was modified or deleted concurrently")]
    Conflict(Uuid),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type IncidentResult<T> = Result<T, IncidentError>;

impl IncidentError {
    /// Whether the same request may succeed later without changes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::EmbeddingUnavailable(_) | Self::Timeout(_)
        )
    }
}

impl From<DbErr> for IncidentError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(e) => IncidentError::StorageUnavailable(e.to_string()),
            DbErr::Conn(e) => IncidentError::StorageUnavailable(e.to_string()),
            DbErr::Query(RuntimeErr::SqlxError(e)) | DbErr::Exec(RuntimeErr::SqlxError(e))
                if is_transport_error(&e) =>
            {
                IncidentError::StorageUnavailable(e.to_string())
            }
            other => IncidentError::Internal(format!("Database error: {}", other)),
        }
    }
}

/// Failures of the connection itself rather than of the statement
fn is_transport_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

impl From<validator::ValidationErrors> for IncidentError {
    fn from(err: validator::ValidationErrors) -> Self {
        IncidentError::Validation(err.to_string())
    }
}

impl From<IncidentError> for AppError {
    fn from(err: IncidentError) -> Self {
        match err {
            IncidentError::Validation(msg) => AppError::BadRequest(msg),
            IncidentError::NotFound(id) => AppError::NotFound(format!("Incident {} not found", id)),
            IncidentError::Conflict(id) => AppError::Conflict(format!(
                "Incident {} was modified concurrently, reload and retry",
                id
            )),
            IncidentError::StorageUnavailable(msg) => AppError::ServiceUnavailable(format!(
                "Incident storage is temporarily unavailable ({})",
                msg
            )),
            IncidentError::EmbeddingUnavailable(msg) => AppError::EmbeddingUnavailable(msg),
            IncidentError::Timeout(msg) => AppError::Timeout(msg),
            IncidentError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for IncidentError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
