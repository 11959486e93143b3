use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tracing::debug;

use crate::common::DatabaseError;

/// Extensions the incident schema cannot work without
pub const REQUIRED_EXTENSIONS: &[&str] = &["postgis", "vector"];

/// Run `SELECT 1` to verify the pool can reach the server
///
/// # Example
/// ```ignore
/// use database::postgres::check_health;
///
/// check_health(&db).await?;
/// ```
pub async fn check_health(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    debug!("Running PostgreSQL health check");

    let stmt = Statement::from_string(DatabaseBackend::Postgres, "SELECT 1".to_owned());
    db.query_one_raw(stmt).await.map_err(|e| {
        DatabaseError::HealthCheckFailed(format!("PostgreSQL health check failed: {}", e))
    })?;

    debug!("PostgreSQL health check passed");
    Ok(())
}

/// Verify every extension in `extensions` is installed in the current database
///
/// Returns [`DatabaseError::MissingExtension`] naming the first one absent.
pub async fn check_extensions(
    db: &DatabaseConnection,
    extensions: &[&str],
) -> Result<(), DatabaseError> {
    for extension in extensions {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT 1 FROM pg_extension WHERE extname = $1",
            [(*extension).into()],
        );

        let row = db.query_one_raw(stmt).await.map_err(|e| {
            DatabaseError::HealthCheckFailed(format!(
                "Failed to look up extension '{}': {}",
                extension, e
            ))
        })?;

        if row.is_none() {
            return Err(DatabaseError::MissingExtension((*extension).to_string()));
        }
    }

    debug!(extensions = ?extensions, "Required PostgreSQL extensions present");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::collections::BTreeMap;

    fn one_row() -> BTreeMap<&'static str, sea_orm::Value> {
        BTreeMap::from([("?column?", sea_orm::Value::Int(Some(1)))])
    }

    #[tokio::test]
    async fn test_check_health_passes_on_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![one_row()]])
            .into_connection();

        assert!(check_health(&db).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_extensions_all_present() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![one_row()], vec![one_row()]])
            .into_connection();

        assert!(check_extensions(&db, REQUIRED_EXTENSIONS).await.is_ok());
    }

    #[tokio::test]
    async fn test_check_extensions_reports_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![one_row()], Vec::new()])
            .into_connection();

        let err = check_extensions(&db, REQUIRED_EXTENSIONS).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MissingExtension(ref name) if name == "vector"));
    }
}
