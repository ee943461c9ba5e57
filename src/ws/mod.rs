//! WebSocket layer: connection acceptance, session loops, envelopes.
//!
//! The endpoint at `/ws` turns every upgraded connection into a peer
//! session attached to the hub.

pub mod connection;
pub mod handler;
pub mod messages;
