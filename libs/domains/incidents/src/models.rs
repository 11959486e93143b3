use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{IncidentError, IncidentResult};
use crate::geometry::{GeoPoint, SearchArea, SearchCircle, SearchPolygon};

pub const DEFAULT_SEARCH_LIMIT: u64 = 10;
pub const DEFAULT_LIST_LIMIT: u64 = 50;
/// Largest offset PostgreSQL accepts as a BIGINT
pub const MAX_OFFSET: u64 = i64::MAX as u64;

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

fn validate_longitude(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(-180.0..=180.0).contains(&value) {
        return Err(ValidationError::new("longitude")
            .with_message("must be a finite number between -180 and 180".into()));
    }
    Ok(())
}

fn validate_latitude(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(-90.0..=90.0).contains(&value) {
        return Err(ValidationError::new("latitude")
            .with_message("must be a finite number between -90 and 90".into()));
    }
    Ok(())
}

fn validate_radius(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 || value > crate::geometry::MAX_RADIUS_METERS {
        return Err(ValidationError::new("radius")
            .with_message("must be a finite number of meters between 0 and 20037509".into()));
    }
    Ok(())
}

fn validate_json_object(value: &serde_json::Value) -> Result<(), ValidationError> {
    if !value.is_object() {
        return Err(ValidationError::new("metadata").with_message("must be a JSON object".into()));
    }
    Ok(())
}

fn validate_reported_range(filter: &IncidentFilter) -> Result<(), ValidationError> {
    if let (Some(from), Some(to)) = (filter.reported_from, filter.reported_to)
        && from > to
    {
        return Err(ValidationError::new("reported_range")
            .with_message("reported_from must not be after reported_to".into()));
    }
    Ok(())
}

fn default_search_limit() -> u64 {
    DEFAULT_SEARCH_LIMIT
}

fn default_list_limit() -> u64 {
    DEFAULT_LIST_LIMIT
}

/// Lifecycle of a report
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentStatus {
    /// Submitted, not yet reviewed
    #[default]
    Reported,
    Verified,
    InProgress,
    Resolved,
    /// Rejected as a duplicate, spam or out of scope
    Dismissed,
}

/// Optional contact details of whoever filed the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReporterInfo {
    #[validate(length(max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
}

/// A geotagged environmental incident report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Incident {
    /// UUID v7, time-ordered
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Category such as "oil_spill" or "illegal_dumping", stored lowercase
    pub incident_type: String,
    /// 1 (minor) to 5 (critical)
    pub severity: i16,
    /// WGS84 longitude
    pub longitude: f64,
    /// WGS84 latitude
    pub latitude: f64,
    pub status: IncidentStatus,
    pub reporter_info: Option<ReporterInfo>,
    /// Free-form JSON object
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    /// When the incident was observed
    pub reported_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Also the concurrency token for updates
    pub updated_at: DateTime<Utc>,
}

/// Request body for submitting a report
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateIncident {
    #[validate(length(min = 1, max = 255), custom(function = "validate_not_blank"))]
    pub title: String,
    #[validate(length(min = 1, max = 10000), custom(function = "validate_not_blank"))]
    pub description: String,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub incident_type: String,
    #[validate(range(min = 1, max = 5))]
    pub severity: i16,
    #[validate(custom(function = "validate_longitude"))]
    pub longitude: f64,
    #[validate(custom(function = "validate_latitude"))]
    pub latitude: f64,
    #[serde(default)]
    pub status: IncidentStatus,
    #[validate(nested)]
    pub reporter_info: Option<ReporterInfo>,
    #[validate(custom(function = "validate_json_object"))]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    /// Defaults to the submission time
    pub reported_at: Option<DateTime<Utc>>,
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateIncident {
    #[validate(length(min = 1, max = 255), custom(function = "validate_not_blank"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000), custom(function = "validate_not_blank"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub incident_type: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub severity: Option<i16>,
    #[validate(custom(function = "validate_longitude"))]
    pub longitude: Option<f64>,
    #[validate(custom(function = "validate_latitude"))]
    pub latitude: Option<f64>,
    pub status: Option<IncidentStatus>,
    #[validate(nested)]
    pub reporter_info: Option<ReporterInfo>,
    #[validate(custom(function = "validate_json_object"))]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    pub reported_at: Option<DateTime<Utc>>,
}

/// Structured filter shared by listing and every search mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_reported_range"))]
pub struct IncidentFilter {
    /// Exact category match (case-insensitive)
    pub incident_type: Option<String>,
    pub status: Option<IncidentStatus>,
    #[validate(range(min = 1, max = 5))]
    pub min_severity: Option<i16>,
    pub reported_from: Option<DateTime<Utc>>,
    pub reported_to: Option<DateTime<Utc>>,
}

impl IncidentFilter {
    /// Category in its stored form
    pub fn normalized_type(&self) -> Option<String> {
        self.incident_type.as_deref().map(normalize_type)
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        if let Some(t) = self.normalized_type()
            && incident.incident_type != t
        {
            return false;
        }
        if let Some(status) = self.status
            && incident.status != status
        {
            return false;
        }
        if let Some(min) = self.min_severity
            && incident.severity < min
        {
            return false;
        }
        if let Some(from) = self.reported_from
            && incident.reported_at < from
        {
            return false;
        }
        if let Some(to) = self.reported_to
            && incident.reported_at > to
        {
            return false;
        }
        true
    }
}

/// Result window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Validate)]
pub struct Page {
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    #[validate(range(max = MAX_OFFSET))]
    pub offset: u64,
}

impl Page {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }
}

/// Query string for `GET /incidents`
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    pub incident_type: Option<String>,
    pub status: Option<IncidentStatus>,
    #[validate(range(min = 1, max = 5))]
    pub min_severity: Option<i16>,
    pub reported_from: Option<DateTime<Utc>>,
    pub reported_to: Option<DateTime<Utc>>,
    /// 1..=100, default 50
    #[serde(default = "default_list_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    #[serde(default)]
    #[validate(range(max = MAX_OFFSET))]
    pub offset: u64,
}

impl ListQuery {
    pub fn filter(&self) -> IncidentFilter {
        IncidentFilter {
            incident_type: self.incident_type.clone(),
            status: self.status,
            min_severity: self.min_severity,
            reported_from: self.reported_from,
            reported_to: self.reported_to,
        }
    }

    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// Query string for `GET /incidents/search/proximity`
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProximityQuery {
    #[validate(custom(function = "validate_latitude"))]
    pub latitude: f64,
    #[validate(custom(function = "validate_longitude"))]
    pub longitude: f64,
    /// Search radius in meters
    #[validate(custom(function = "validate_radius"))]
    pub radius: f64,
    pub incident_type: Option<String>,
    pub status: Option<IncidentStatus>,
    #[validate(range(min = 1, max = 5))]
    pub min_severity: Option<i16>,
    pub reported_from: Option<DateTime<Utc>>,
    pub reported_to: Option<DateTime<Utc>>,
    /// 1..=100, default 10
    #[serde(default = "default_search_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    #[serde(default)]
    #[validate(range(max = MAX_OFFSET))]
    pub offset: u64,
}

impl ProximityQuery {
    pub fn center(&self) -> IncidentResult<GeoPoint> {
        GeoPoint::new(self.longitude, self.latitude)
    }

    pub fn filter(&self) -> IncidentFilter {
        IncidentFilter {
            incident_type: self.incident_type.clone(),
            status: self.status,
            min_severity: self.min_severity,
            reported_from: self.reported_from,
            reported_to: self.reported_to,
        }
    }

    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// Query string for `GET /incidents/search/similar`
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SimilarityQuery {
    /// Free text compared against incident descriptions
    #[validate(length(min = 1, max = 2000), custom(function = "validate_not_blank"))]
    pub q: String,
    pub incident_type: Option<String>,
    pub status: Option<IncidentStatus>,
    #[validate(range(min = 1, max = 5))]
    pub min_severity: Option<i16>,
    pub reported_from: Option<DateTime<Utc>>,
    pub reported_to: Option<DateTime<Utc>>,
    /// 1..=100, default 10
    #[serde(default = "default_search_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    #[serde(default)]
    #[validate(range(max = MAX_OFFSET))]
    pub offset: u64,
}

impl SimilarityQuery {
    pub fn filter(&self) -> IncidentFilter {
        IncidentFilter {
            incident_type: self.incident_type.clone(),
            status: self.status,
            min_severity: self.min_severity,
            reported_from: self.reported_from,
            reported_to: self.reported_to,
        }
    }

    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// Circle given inside an area search body
#[derive(Debug, Clone, Copy, Deserialize, Validate, ToSchema)]
pub struct CircleArea {
    #[validate(custom(function = "validate_longitude"))]
    pub longitude: f64,
    #[validate(custom(function = "validate_latitude"))]
    pub latitude: f64,
    /// Meters
    #[validate(custom(function = "validate_radius"))]
    pub radius: f64,
}

/// Body of `POST /incidents/search/area`; exactly one of `polygon`, `bbox`
/// or `circle`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AreaSearchRequest {
    /// GeoJSON Polygon geometry, holes allowed
    #[schema(value_type = Option<Object>)]
    pub polygon: Option<geojson::Geometry>,
    /// `[west, south, east, north]` in degrees
    #[schema(value_type = Option<Vec<f64>>)]
    pub bbox: Option<[f64; 4]>,
    #[validate(nested)]
    pub circle: Option<CircleArea>,
    #[serde(flatten)]
    #[validate(nested)]
    pub filter: IncidentFilter,
    #[serde(default = "default_search_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    #[serde(default)]
    #[validate(range(max = MAX_OFFSET))]
    pub offset: u64,
}

impl AreaSearchRequest {
    /// Validate and resolve the region to search
    pub fn area(&self) -> IncidentResult<SearchArea> {
        match (&self.polygon, &self.bbox, &self.circle) {
            (Some(geometry), None, None) => {
                Ok(SearchArea::Polygon(SearchPolygon::from_geojson(geometry)?))
            }
            (None, Some(bbox), None) => Ok(SearchArea::Polygon(SearchPolygon::from_bbox(*bbox)?)),
            (None, None, Some(circle)) => Ok(SearchArea::Circle(SearchCircle::new(
                GeoPoint::new(circle.longitude, circle.latitude)?,
                circle.radius,
            )?)),
            _ => Err(IncidentError::Validation(
                "exactly one of polygon, bbox or circle is required".to_string(),
            )),
        }
    }

    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// Proximity result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProximityHit {
    #[serde(flatten)]
    pub incident: Incident,
    /// Geodesic distance from the search center
    pub distance_meters: f64,
}

/// Similarity result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SimilarityHit {
    #[serde(flatten)]
    pub incident: Incident,
    /// Cosine distance, 0 for identical direction
    pub distance: f64,
    /// `1 - distance`
    pub similarity: f64,
}

impl SimilarityHit {
    pub fn new(incident: Incident, distance: f64) -> Self {
        Self {
            incident,
            distance,
            similarity: 1.0 - distance,
        }
    }
}

pub fn normalize_type(value: &str) -> String {
    value.trim().to_lowercase()
}

impl Incident {
    /// Build a new report from validated input
    pub fn new(input: CreateIncident) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            title: input.title,
            description: input.description,
            incident_type: normalize_type(&input.incident_type),
            severity: input.severity,
            longitude: input.longitude,
            latitude: input.latitude,
            status: input.status,
            reporter_info: input.reporter_info,
            metadata: input.metadata,
            reported_at: input.reported_at.unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint {
            longitude: self.longitude,
            latitude: self.latitude,
        }
    }

    /// Merge a partial update; the resulting location is revalidated
    pub fn apply_update(&mut self, update: UpdateIncident) -> IncidentResult<()> {
        let location = GeoPoint::new(
            update.longitude.unwrap_or(self.longitude),
            update.latitude.unwrap_or(self.latitude),
        )?;
        self.longitude = location.longitude;
        self.latitude = location.latitude;

        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(incident_type) = update.incident_type {
            self.incident_type = normalize_type(&incident_type);
        }
        if let Some(severity) = update.severity {
            self.severity = severity;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(reporter_info) = update.reporter_info {
            self.reporter_info = Some(reporter_info);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = Some(metadata);
        }
        if let Some(reported_at) = update.reported_at {
            self.reported_at = reported_at;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}
