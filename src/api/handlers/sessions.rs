//! Session membership endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::SessionsResponse;
use crate::app_state::AppState;
use crate::error::RelayError;

/// `GET /api/v1/sessions` — List the identities of connected peers.
///
/// # Errors
///
/// Returns [`RelayError::HubClosed`] (503) if the hub control loop has
/// stopped.
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "List connected peers",
    description = "Returns a snapshot of the hub's membership, taken inside the hub's control loop.",
    responses(
        (status = 200, description = "Membership snapshot", body = SessionsResponse),
        (status = 503, description = "Hub is not running"),
    )
)]
pub async fn list_sessions_handler(
    State(state): State<AppState>,
) -> Result<Json<SessionsResponse>, RelayError> {
    let members = state.hub.members().await?;
    Ok(Json(SessionsResponse {
        count: members.len(),
        sessions: members.iter().map(ToString::to_string).collect(),
    }))
}

/// Session routes, nested under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sessions", get(list_sessions_handler))
}
