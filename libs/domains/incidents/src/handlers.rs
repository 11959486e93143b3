use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use axum_helpers::{
    AuditEvent, AuditOutcome, UuidPath, ValidatedJson, ValidatedQuery,
    errors::responses::{
        BadRequestUuidResponse, BadRequestValidationResponse, ConflictResponse,
        InternalServerErrorResponse, NotFoundResponse, ServiceUnavailableResponse,
    },
    extract_ip_from_headers, extract_user_agent,
};
use serde_json::json;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::IncidentResult;
use crate::models::{
    AreaSearchRequest, CircleArea, CreateIncident, Incident, IncidentFilter, IncidentStatus,
    ListQuery, ProximityHit, ProximityQuery, ReporterInfo, SimilarityHit, SimilarityQuery,
    UpdateIncident,
};
use crate::repository::IncidentRepository;
use crate::service::IncidentService;

pub const TAG: &str = "incidents";

/// Header carrying the total number of incidents matching a list filter
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// OpenAPI documentation for the Incidents API
#[derive(OpenApi)]
#[openapi(
    paths(
        list_incidents,
        create_incident,
        get_incident,
        update_incident,
        delete_incident,
        search_proximity,
        search_area,
        search_similar,
    ),
    components(
        schemas(
            Incident,
            IncidentStatus,
            ReporterInfo,
            CreateIncident,
            UpdateIncident,
            IncidentFilter,
            AreaSearchRequest,
            CircleArea,
            ProximityHit,
            SimilarityHit
        ),
        responses(
            NotFoundResponse,
            BadRequestValidationResponse,
            BadRequestUuidResponse,
            ConflictResponse,
            ServiceUnavailableResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = TAG, description = "Environmental incident reports and geospatial / semantic search")
    )
)]
pub struct ApiDoc;

/// Create the incident router with all HTTP endpoints
pub fn router<R: IncidentRepository + 'static>(service: IncidentService<R>) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/", get(list_incidents).post(create_incident))
        .route("/search/proximity", get(search_proximity))
        .route("/search/area", post(search_area))
        .route("/search/similar", get(search_similar))
        .route(
            "/{id}",
            get(get_incident).put(update_incident).delete(delete_incident),
        )
        .with_state(shared_service)
}

/// List incidents, newest first
#[utoipa::path(
    get,
    path = "",
    tag = TAG,
    params(ListQuery),
    responses(
        (status = 200, description = "Page of incidents", body = Vec<Incident>,
            headers(("X-Total-Count" = u64, description = "Incidents matching the filter"))),
        (status = 400, response = BadRequestValidationResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_incidents<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> IncidentResult<impl IntoResponse> {
    let (incidents, total) = service
        .list_incidents(query.filter(), query.page())
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));

    Ok((headers, Json(incidents)))
}

/// Submit a new incident report
#[utoipa::path(
    post,
    path = "",
    tag = TAG,
    request_body = CreateIncident,
    responses(
        (status = 201, description = "Incident created", body = Incident),
        (status = 400, response = BadRequestValidationResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn create_incident<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    headers: HeaderMap,
    ValidatedJson(input): ValidatedJson<CreateIncident>,
) -> IncidentResult<impl IntoResponse> {
    let incident = service.create_incident(input).await?;

    AuditEvent::new(
        "incident.create",
        Some(format!("incident:{}", incident.id)),
        AuditOutcome::Success,
    )
    .with_ip(extract_ip_from_headers(&headers))
    .with_user_agent(extract_user_agent(&headers))
    .with_details(json!({
        "incident_type": incident.incident_type,
        "severity": incident.severity,
        "longitude": incident.longitude,
        "latitude": incident.latitude,
    }))
    .log();

    Ok((StatusCode::CREATED, Json(incident)))
}

/// Get an incident by ID
#[utoipa::path(
    get,
    path = "/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Incident ID")
    ),
    responses(
        (status = 200, description = "Incident found", body = Incident),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_incident<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    UuidPath(id): UuidPath,
) -> IncidentResult<Json<Incident>> {
    let incident = service.get_incident(id).await?;
    Ok(Json(incident))
}

/// Update an incident; only the fields present are changed
#[utoipa::path(
    put,
    path = "/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Incident ID")
    ),
    request_body = UpdateIncident,
    responses(
        (status = 200, description = "Incident updated", body = Incident),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn update_incident<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    headers: HeaderMap,
    UuidPath(id): UuidPath,
    ValidatedJson(input): ValidatedJson<UpdateIncident>,
) -> IncidentResult<Json<Incident>> {
    let description_changed = input.description.is_some();
    let incident = service.update_incident(id, input).await?;

    AuditEvent::new(
        "incident.update",
        Some(format!("incident:{}", id)),
        AuditOutcome::Success,
    )
    .with_ip(extract_ip_from_headers(&headers))
    .with_user_agent(extract_user_agent(&headers))
    .with_details(json!({
        "status": incident.status,
        "description_submitted": description_changed,
    }))
    .log();

    Ok(Json(incident))
}

/// Delete an incident
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Incident ID")
    ),
    responses(
        (status = 204, description = "Incident deleted"),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn delete_incident<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    headers: HeaderMap,
    UuidPath(id): UuidPath,
) -> IncidentResult<impl IntoResponse> {
    service.delete_incident(id).await?;

    AuditEvent::new(
        "incident.delete",
        Some(format!("incident:{}", id)),
        AuditOutcome::Success,
    )
    .with_ip(extract_ip_from_headers(&headers))
    .with_user_agent(extract_user_agent(&headers))
    .log();

    Ok(StatusCode::NO_CONTENT)
}

/// Incidents within a radius of a point, nearest first
#[utoipa::path(
    get,
    path = "/search/proximity",
    tag = TAG,
    params(ProximityQuery),
    responses(
        (status = 200, description = "Incidents ordered by distance", body = Vec<ProximityHit>),
        (status = 400, response = BadRequestValidationResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn search_proximity<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    ValidatedQuery(query): ValidatedQuery<ProximityQuery>,
) -> IncidentResult<Json<Vec<ProximityHit>>> {
    let hits = service
        .search_proximity(query.center()?, query.radius, query.filter(), query.page())
        .await?;
    Ok(Json(hits))
}

/// Incidents inside a polygon, bounding box or circle
#[utoipa::path(
    post,
    path = "/search/area",
    tag = TAG,
    request_body = AreaSearchRequest,
    responses(
        (status = 200, description = "Incidents inside the area", body = Vec<Incident>),
        (status = 400, response = BadRequestValidationResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn search_area<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    ValidatedJson(request): ValidatedJson<AreaSearchRequest>,
) -> IncidentResult<Json<Vec<Incident>>> {
    let area = request.area()?;
    let incidents = service
        .search_area(area, request.filter.clone(), request.page())
        .await?;
    Ok(Json(incidents))
}

/// Incidents whose descriptions are semantically closest to the query text
#[utoipa::path(
    get,
    path = "/search/similar",
    tag = TAG,
    params(SimilarityQuery),
    responses(
        (status = 200, description = "Incidents ordered by cosine distance", body = Vec<SimilarityHit>),
        (status = 400, response = BadRequestValidationResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn search_similar<R: IncidentRepository>(
    State(service): State<Arc<IncidentService<R>>>,
    ValidatedQuery(query): ValidatedQuery<SimilarityQuery>,
) -> IncidentResult<Json<Vec<SimilarityHit>>> {
    let hits = service
        .search_similar(&query.q, query.filter(), query.page())
        .await?;
    Ok(Json(hits))
}
