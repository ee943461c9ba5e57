//! HTTP layer: operational endpoints, OpenAPI document, and the full
//! application router.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and `/ws` sit
//! at the root and everything else falls through to the static file
//! directory.

pub mod dto;
pub mod handlers;

use std::path::Path;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI description of the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "peer-relay", description = "Real-time WebSocket message relay"),
    paths(
        handlers::system::health_handler,
        handlers::sessions::list_sessions_handler,
    ),
    components(schemas(dto::HealthResponse, dto::SessionsResponse)),
    tags(
        (name = "System", description = "Service health"),
        (name = "Sessions", description = "Connected peers"),
    )
)]
pub struct ApiDoc;

/// Builds the router with all HTTP endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

/// Builds the complete application: HTTP endpoints, the `/ws` upgrade
/// route, and static files from `static_dir` for every other path.
pub fn build_app(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
