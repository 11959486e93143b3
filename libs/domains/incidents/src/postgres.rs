//! PostgreSQL implementation backed by PostGIS and pgvector.
//!
//! Spatial and vector queries are raw SQL through SeaORM statements:
//! `ST_DWithin`/`ST_Distance` on `geography` for proximity, `ST_Covers` on
//! `geometry` for areas, and pgvector's cosine operator `<=>` for similarity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, Statement, Value};
use std::str::FromStr;
use uuid::Uuid;

use crate::embedding::Embedding;
use crate::error::{IncidentError, IncidentResult};
use crate::geometry::{SearchCircle, SearchPolygon};
use crate::models::{
    Incident, IncidentFilter, IncidentStatus, Page, ProximityHit, ReporterInfo, SimilarityHit,
};
use crate::repository::IncidentRepository;

const SELECT_COLUMNS: &str = "id, title, description, incident_type, severity, longitude, \
     latitude, status, reporter_info, metadata, reported_at, created_at, updated_at";

/// Accumulates SQL text and its positional parameters
struct SqlBuilder {
    sql: String,
    values: Vec<Value>,
}

impl SqlBuilder {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }

    /// Register a parameter and return its `$n` placeholder
    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn push_filter(&mut self, filter: &IncidentFilter) {
        if let Some(incident_type) = filter.normalized_type() {
            let p = self.bind(incident_type);
            self.push(&format!(" AND incident_type = {}", p));
        }
        if let Some(status) = filter.status {
            let p = self.bind(status.as_ref().to_string());
            self.push(&format!(" AND status = {}", p));
        }
        if let Some(min_severity) = filter.min_severity {
            let p = self.bind(min_severity);
            self.push(&format!(" AND severity >= {}", p));
        }
        if let Some(from) = filter.reported_from {
            let p = self.bind(from);
            self.push(&format!(" AND reported_at >= {}", p));
        }
        if let Some(to) = filter.reported_to {
            let p = self.bind(to);
            self.push(&format!(" AND reported_at <= {}", p));
        }
    }

    fn push_page(&mut self, page: Page) -> IncidentResult<()> {
        let limit = i64::try_from(page.limit)
            .map_err(|_| IncidentError::Validation(format!("limit {} is too large", page.limit)))?;
        let offset = i64::try_from(page.offset)
            .map_err(|_| IncidentError::Validation(format!("offset {} is too large", page.offset)))?;

        let limit = self.bind(limit);
        let offset = self.bind(offset);
        self.push(&format!(" LIMIT {} OFFSET {}", limit, offset));
        Ok(())
    }

    fn build(self) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, self.sql, self.values)
    }
}

fn point_sql(lon: &str, lat: &str) -> String {
    format!("ST_SetSRID(ST_MakePoint({}, {}), 4326)::geography", lon, lat)
}

fn json_value<T: serde::Serialize>(value: Option<&T>) -> IncidentResult<Option<serde_json::Value>> {
    value
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| IncidentError::Internal(format!("Failed to encode JSON column: {}", e)))
}

fn decode_error(column: &str, err: impl std::fmt::Display) -> IncidentError {
    IncidentError::Internal(format!("Failed to decode column '{}': {}", column, err))
}

fn incident_from_row(row: &QueryResult) -> IncidentResult<Incident> {
    let status: String = row.try_get("", "status")?;
    let status = IncidentStatus::from_str(&status).map_err(|e| decode_error("status", e))?;

    let reporter_info: Option<serde_json::Value> = row.try_get("", "reporter_info")?;
    let reporter_info = reporter_info
        .map(serde_json::from_value::<ReporterInfo>)
        .transpose()
        .map_err(|e| decode_error("reporter_info", e))?;

    Ok(Incident {
        id: row.try_get("", "id")?,
        title: row.try_get("", "title")?,
        description: row.try_get("", "description")?,
        incident_type: row.try_get("", "incident_type")?,
        severity: row.try_get("", "severity")?,
        longitude: row.try_get("", "longitude")?,
        latitude: row.try_get("", "latitude")?,
        status,
        reporter_info,
        metadata: row.try_get("", "metadata")?,
        reported_at: row.try_get("", "reported_at")?,
        created_at: row.try_get("", "created_at")?,
        updated_at: row.try_get("", "updated_at")?,
    })
}

pub struct PgIncidentRepository {
    db: DatabaseConnection,
}

impl PgIncidentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn fetch_incidents(&self, stmt: Statement) -> IncidentResult<Vec<Incident>> {
        let rows = self.db.query_all_raw(stmt).await?;
        rows.iter().map(incident_from_row).collect()
    }
}

#[async_trait]
impl IncidentRepository for PgIncidentRepository {
    async fn create(&self, incident: Incident, embedding: Embedding) -> IncidentResult<Incident> {
        let mut q = SqlBuilder::new(
            "INSERT INTO incidents (id, title, description, incident_type, severity, \
             longitude, latitude, location, status, reporter_info, metadata, \
             description_embedding, reported_at, created_at, updated_at) VALUES (",
        );

        let id = q.bind(incident.id);
        let title = q.bind(incident.title.clone());
        let description = q.bind(incident.description.clone());
        let incident_type = q.bind(incident.incident_type.clone());
        let severity = q.bind(incident.severity);
        let lon = q.bind(incident.longitude);
        let lat = q.bind(incident.latitude);
        let status = q.bind(incident.status.as_ref().to_string());
        let reporter_info = q.bind(json_value(incident.reporter_info.as_ref())?);
        let metadata = q.bind(incident.metadata.clone());
        let vector = q.bind(embedding.to_pgvector());
        let reported_at = q.bind(incident.reported_at);
        let created_at = q.bind(incident.created_at);
        let updated_at = q.bind(incident.updated_at);

        q.push(&format!(
            "{id}, {title}, {description}, {incident_type}, {severity}, {lon}, {lat}, {location}, \
             {status}, {reporter_info}, {metadata}, {vector}::vector, {reported_at}, \
             {created_at}, {updated_at}) RETURNING {SELECT_COLUMNS}",
            location = point_sql(&lon, &lat),
        ));

        let row = self
            .db
            .query_one_raw(q.build())
            .await?
            .ok_or_else(|| IncidentError::Internal("INSERT returned no row".to_string()))?;

        let created = incident_from_row(&row)?;
        tracing::info!(incident_id = %created.id, "Created incident");
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> IncidentResult<Option<Incident>> {
        let mut q = SqlBuilder::new(format!("SELECT {} FROM incidents WHERE id = ", SELECT_COLUMNS));
        let p = q.bind(id);
        q.push(&p);

        let row = self.db.query_one_raw(q.build()).await?;
        row.as_ref().map(incident_from_row).transpose()
    }

    async fn list(&self, filter: &IncidentFilter, page: Page) -> IncidentResult<Vec<Incident>> {
        let mut q = SqlBuilder::new(format!("SELECT {} FROM incidents WHERE TRUE", SELECT_COLUMNS));
        q.push_filter(filter);
        q.push(" ORDER BY created_at DESC, id");
        q.push_page(page)?;

        self.fetch_incidents(q.build()).await
    }

    async fn count(&self, filter: &IncidentFilter) -> IncidentResult<u64> {
        let mut q = SqlBuilder::new("SELECT COUNT(*) AS count FROM incidents WHERE TRUE");
        q.push_filter(filter);

        let row = self
            .db
            .query_one_raw(q.build())
            .await?
            .ok_or_else(|| IncidentError::Internal("COUNT returned no row".to_string()))?;
        let count: i64 = row.try_get("", "count")?;
        Ok(count.max(0) as u64)
    }

    async fn update(
        &self,
        incident: Incident,
        embedding: Option<Embedding>,
        expected_updated_at: DateTime<Utc>,
    ) -> IncidentResult<Option<Incident>> {
        let mut q = SqlBuilder::new("UPDATE incidents SET ");

        let title = q.bind(incident.title.clone());
        let description = q.bind(incident.description.clone());
        let incident_type = q.bind(incident.incident_type.clone());
        let severity = q.bind(incident.severity);
        let lon = q.bind(incident.longitude);
        let lat = q.bind(incident.latitude);
        let status = q.bind(incident.status.as_ref().to_string());
        let reporter_info = q.bind(json_value(incident.reporter_info.as_ref())?);
        let metadata = q.bind(incident.metadata.clone());
        let reported_at = q.bind(incident.reported_at);
        let vector = q.bind(embedding.map(|e| e.to_pgvector()));
        let id = q.bind(incident.id);
        let token = q.bind(expected_updated_at);

        // updated_at is set by the incidents_touch_updated_at trigger
        q.push(&format!(
            "title = {title}, description = {description}, incident_type = {incident_type}, \
             severity = {severity}, longitude = {lon}, latitude = {lat}, location = {location}, \
             status = {status}, reporter_info = {reporter_info}, metadata = {metadata}, \
             reported_at = {reported_at}, \
             description_embedding = COALESCE({vector}::vector, description_embedding) \
             WHERE id = {id} AND updated_at = {token} RETURNING {SELECT_COLUMNS}",
            location = point_sql(&lon, &lat),
        ));

        let row = self.db.query_one_raw(q.build()).await?;
        let updated = row.as_ref().map(incident_from_row).transpose()?;

        if let Some(updated) = &updated {
            tracing::info!(incident_id = %updated.id, "Updated incident");
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> IncidentResult<bool> {
        let mut q = SqlBuilder::new("DELETE FROM incidents WHERE id = ");
        let p = q.bind(id);
        q.push(&p);

        let result = self.db.execute_raw(q.build()).await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(incident_id = %id, "Deleted incident");
        }
        Ok(deleted)
    }

    async fn search_within_radius(
        &self,
        circle: &SearchCircle,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<ProximityHit>> {
        let mut q = SqlBuilder::new("");
        let lon = q.bind(circle.center.longitude);
        let lat = q.bind(circle.center.latitude);
        let radius = q.bind(circle.radius_meters);
        let center = point_sql(&lon, &lat);

        q.push(&format!(
            "SELECT {SELECT_COLUMNS}, ST_Distance(location, {center}) AS distance_meters \
             FROM incidents WHERE ST_DWithin(location, {center}, {radius})"
        ));
        q.push_filter(filter);
        q.push(" ORDER BY distance_meters ASC, created_at DESC, id");
        q.push_page(page)?;

        let rows = self.db.query_all_raw(q.build()).await?;
        rows.iter()
            .map(|row| {
                Ok(ProximityHit {
                    incident: incident_from_row(row)?,
                    distance_meters: row.try_get("", "distance_meters")?,
                })
            })
            .collect()
    }

    async fn search_within_polygon(
        &self,
        polygon: &SearchPolygon,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<Incident>> {
        let mut q = SqlBuilder::new("");
        let area = q.bind(polygon.to_geojson_string()?);

        q.push(&format!(
            "SELECT {SELECT_COLUMNS} FROM incidents \
             WHERE ST_Covers(ST_SetSRID(ST_GeomFromGeoJSON({area}), 4326), location::geometry)"
        ));
        q.push_filter(filter);
        q.push(" ORDER BY created_at DESC, id");
        q.push_page(page)?;

        self.fetch_incidents(q.build()).await
    }

    async fn search_similar(
        &self,
        embedding: &Embedding,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<SimilarityHit>> {
        let mut q = SqlBuilder::new("");
        let vector = q.bind(embedding.to_pgvector());

        q.push(&format!(
            "SELECT {SELECT_COLUMNS}, (description_embedding <=> {vector}::vector) AS distance \
             FROM incidents WHERE description_embedding IS NOT NULL"
        ));
        q.push_filter(filter);
        q.push(" ORDER BY distance ASC, created_at DESC, id");
        q.push_page(page)?;

        let rows = self.db.query_all_raw(q.build()).await?;
        rows.iter()
            .map(|row| {
                let distance: f64 = row.try_get("", "distance")?;
                Ok(SimilarityHit::new(incident_from_row(row)?, distance))
            })
            .collect()
    }
}
