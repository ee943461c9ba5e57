//! Response bodies for the system and session endpoints.

use serde::Serialize;
use utoipa::ToSchema;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"` when the hub answered.
    pub status: String,
    /// RFC 3339 timestamp of the check.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Number of registered peer sessions.
    pub sessions: usize,
}

/// Snapshot of the hub's membership.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionsResponse {
    /// Number of registered peer sessions.
    pub count: usize,
    /// Identities of the registered sessions, sorted.
    pub sessions: Vec<String>,
}
