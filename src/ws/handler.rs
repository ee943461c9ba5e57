//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::start_session;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade the HTTP connection and join the relay.
///
/// The upgrade enforces the inbound size limit at the frame level; the new
/// peer gets a fresh identity from the configured [`crate::domain::IdentitySource`].
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let limits = state.limits;
    let identities = Arc::clone(&state.identities);
    let hub = state.hub;

    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_message_size)
        .on_upgrade(move |socket| async move {
            let id = identities.next_id();
            if let Err(err) = start_session(socket, id.clone(), hub, limits).await {
                tracing::error!(session = %id, error = %err, "failed to start session");
            }
        })
}
