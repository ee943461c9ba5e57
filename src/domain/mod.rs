//! Domain layer: peer identity and the hub that owns session membership.
//!
//! The hub is the only component that mutates the set of connected peers;
//! sessions and HTTP handlers reach it through a [`HubHandle`].

pub mod hub;
pub mod session_id;

pub use hub::{DropPolicy, Hub, HubHandle, Payload, SessionHandle};
pub use session_id::{IdentitySource, SessionId, UuidIdentity};
