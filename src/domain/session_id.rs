//! Peer session identity.
//!
//! [`SessionId`] is an opaque, immutable string assigned once when a
//! connection is accepted. [`IdentitySource`] is the injected generator;
//! [`UuidIdentity`] is the production implementation.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Unique identifier for a connected peer.
///
/// Cheap to clone (shared string). Used as the membership key in
/// [`super::Hub`] and injected as the `id` field of every envelope the
/// peer sends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Wraps an existing identity string.
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

/// Produces a fresh, process-unique identity for each accepted connection.
pub trait IdentitySource: Send + Sync + fmt::Debug {
    /// Returns an identity that has never been returned before.
    fn next_id(&self) -> SessionId;
}

/// Issues random UUID v4 identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdentity;

impl IdentitySource for UuidIdentity {
    fn next_id(&self) -> SessionId {
        SessionId::from(uuid::Uuid::new_v4().to_string())
    }
}
