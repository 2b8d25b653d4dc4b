//! API models for request and response payloads

use serde::Serialize;

pub mod timer;

pub use timer::{CreateTimerRequest, DetectRequest, DetectResponse, TimerListResponse, TimerResponse};

/// Response for operations without a payload
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
