//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::SessionLimits;
use crate::domain::{HubHandle, IdentitySource};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the running hub.
    pub hub: HubHandle,
    /// Source of identities for newly accepted peers.
    pub identities: Arc<dyn IdentitySource>,
    /// Limits applied to every peer session.
    pub limits: SessionLimits,
}
