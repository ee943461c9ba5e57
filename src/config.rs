//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to defaults; out-of-range values are rejected.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::DropPolicy;
use crate::error::RelayError;

/// Default bind address when neither `LISTEN_ADDR` nor `PORT` is set.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Text,
    /// One JSON object per line.
    Json,
}

/// Per-connection limits shared by every peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Capacity of each session's outbound queue.
    pub outbound_capacity: usize,
    /// How long a peer may stay silent before a pong is required.
    pub pong_wait: Duration,
    /// Deadline for a single outbound write.
    pub write_wait: Duration,
}

impl SessionLimits {
    /// Interval between liveness probes: nine tenths of [`Self::pong_wait`],
    /// so a probe always goes out before the peer's read deadline passes.
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] if a size, capacity or timeout
    /// is zero.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.max_message_size == 0 {
            return Err(RelayError::InvalidConfig(
                "MAX_MESSAGE_SIZE must be positive".to_string(),
            ));
        }
        if self.outbound_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "OUTBOUND_QUEUE_CAPACITY must be positive".to_string(),
            ));
        }
        if self.ping_period().is_zero() {
            return Err(RelayError::InvalidConfig(
                "PONG_WAIT_SECS must be positive".to_string(),
            ));
        }
        if self.write_wait.is_zero() {
            return Err(RelayError::InvalidConfig(
                "WRITE_WAIT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_message_size: 1024,
            outbound_capacity: 256,
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        }
    }
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Directory served as static files at `/`.
    pub static_dir: PathBuf,

    /// Capacity of each of the hub's event channels.
    pub hub_event_capacity: usize,

    /// Whether backpressure drops are announced to the remaining peers.
    pub drop_policy: DropPolicy,

    /// Per-session limits.
    pub limits: SessionLimits,

    /// Log output format.
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] if `LISTEN_ADDR` cannot be
    /// parsed or a limit is out of range.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = match (lookup("LISTEN_ADDR"), lookup("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => format!("0.0.0.0:{port}"),
            (None, None) => DEFAULT_LISTEN_ADDR.to_string(),
        };
        let listen_addr: SocketAddr = listen_addr.parse().map_err(|err| {
            RelayError::InvalidConfig(format!("listen address {listen_addr:?}: {err}"))
        })?;

        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./static"));

        let defaults = SessionLimits::default();
        let limits = SessionLimits {
            max_message_size: parse_key(&lookup, "MAX_MESSAGE_SIZE", defaults.max_message_size),
            outbound_capacity: parse_key(
                &lookup,
                "OUTBOUND_QUEUE_CAPACITY",
                defaults.outbound_capacity,
            ),
            pong_wait: Duration::from_secs(parse_key(
                &lookup,
                "PONG_WAIT_SECS",
                defaults.pong_wait.as_secs(),
            )),
            write_wait: Duration::from_secs(parse_key(
                &lookup,
                "WRITE_WAIT_SECS",
                defaults.write_wait.as_secs(),
            )),
        };
        limits.validate()?;

        let hub_event_capacity = parse_key(&lookup, "HUB_EVENT_CAPACITY", 1024);
        if hub_event_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "HUB_EVENT_CAPACITY must be positive".to_string(),
            ));
        }

        let drop_policy = if parse_bool(&lookup, "ANNOUNCE_DROPPED_PEERS", true) {
            DropPolicy::Announce
        } else {
            DropPolicy::Silent
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            static_dir,
            hub_event_capacity,
            drop_policy,
            limits,
            log_format,
        })
    }
}

/// Parses a looked-up value as `T`, returning `default` on missing or
/// invalid values.
fn parse_key<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses a looked-up value as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"`. Returns `default` otherwise.
fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
