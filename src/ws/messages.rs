//! WebSocket envelopes: server-generated messages and sender tagging.
//!
//! Peers exchange JSON objects of the form `{"type": ..., ...}`. The relay
//! never interprets the payload fields; it only stamps the sender's identity
//! into the object before fan-out.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{Payload, SessionId};
use crate::error::RelayError;

/// Messages generated by the relay itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sent once to a freshly accepted peer, carrying its own identity.
    YourId {
        /// Identity assigned to the receiving peer.
        id: SessionId,
    },
    /// Broadcast to the remaining peers when a peer leaves.
    PlayerLeft {
        /// Identity of the departed peer.
        id: SessionId,
    },
}

impl ServerMessage {
    /// Serializes the message into an outbound text payload.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidEnvelope`] if serialization fails.
    pub fn encode(&self) -> Result<Payload, RelayError> {
        Ok(Payload::from(serde_json::to_string(self)?))
    }
}

/// Rewrites an inbound envelope so that `id` is the sender's identity.
///
/// The message is parsed as a JSON object and re-serialized with `id` as the
/// first key; every other key keeps its original order. A peer-supplied `id`
/// is replaced, so a peer cannot impersonate another sender.
///
/// # Errors
///
/// Returns [`RelayError::InvalidEnvelope`] if `raw` is not a JSON object.
pub fn tag_sender(raw: &str, sender: &SessionId) -> Result<String, RelayError> {
    let fields: Map<String, Value> = serde_json::from_str(raw)?;

    let mut tagged = Map::with_capacity(fields.len() + 1);
    tagged.insert("id".to_string(), Value::String(sender.to_string()));
    for (key, value) in fields {
        if key != "id" {
            tagged.insert(key, value);
        }
    }

    Ok(serde_json::to_string(&tagged)?)
}
