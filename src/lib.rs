//! # peer-relay
//!
//! Real-time WebSocket message relay.
//!
//! Every connected peer gets a unique identity. Each JSON message a peer
//! sends is tagged with that identity and rebroadcast to all connected
//! peers; when a peer leaves, the rest are told with a `playerLeft` notice.
//!
//! ## Architecture
//!
//! ```text
//! Peers (WebSocket)
//!     │
//!     ├── WS Handler (ws/handler)      accept, assign identity
//!     ├── Session loops (ws/connection) read ──► hub ──► write
//!     │
//!     ├── Hub (domain/hub)             single task owning membership
//!     │
//!     └── HTTP (api/)                  /health, /api/v1/sessions, static files
//! ```
//!
//! The hub is the only place membership changes. Registration,
//! unregistration and broadcast reach it as messages on separate channels
//! and are applied one at a time, so no lock guards the session set. A peer
//! that cannot keep up with its outbound queue is dropped instead of slowing
//! everyone else down.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ws;
