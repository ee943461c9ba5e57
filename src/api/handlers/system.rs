//! System endpoints: health check and OpenAPI document.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::HealthResponse;
use crate::app_state::AppState;
use crate::error::RelayError;

/// `GET /health` — Service health status.
///
/// # Errors
///
/// Returns [`RelayError::HubClosed`] (503) if the hub control loop has
/// stopped.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health, version, timestamp and the number of connected peers.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Hub is not running"),
    )
)]
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RelayError> {
    let sessions = state.hub.members().await?.len();
    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions,
        }),
    ))
}

/// `GET /api-docs/openapi.json` — OpenAPI document for the HTTP surface.
#[cfg(not(feature = "swagger-ui"))]
pub async fn openapi_handler() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::api::ApiDoc::openapi())
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    let router = Router::new().route("/health", get(health_handler));
    // With the feature on, Swagger UI serves the document itself.
    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route("/api-docs/openapi.json", get(openapi_handler));
    router
}
