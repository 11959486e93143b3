use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(axum_helpers::ErrorResponse)
    ),
    info(
        title = "Incidents API",
        version = "0.1.0",
        description = "Environmental incident reports with proximity, area and semantic search"
    ),
    servers(
        (url = "/api", description = "API base path")
    ),
    nest(
        (path = "/incidents", api = domain_incidents::handlers::ApiDoc)
    )
)]
pub struct ApiDoc;
