//! Data Transfer Objects for the operational HTTP endpoints.

pub mod system_dto;

pub use system_dto::{HealthResponse, SessionsResponse};
