//! Timer models for the REST API

use common::timer::{DEFAULT_LABEL, Timer, TimerStatus};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::labels::DetectedTimer;

/// Message returned when an upsert lacks an identifier
pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: userId, timerId, creationId";

/// Body of `POST /api/v2/timers`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimerRequest {
    pub user_id: Option<String>,
    pub timer_id: Option<String>,
    pub creation_id: Option<String>,
    /// Seconds
    pub duration: Option<u64>,
    pub label: Option<String>,
    /// Seconds
    pub remaining: Option<u64>,
    pub status: Option<TimerStatus>,
    pub step_index: Option<u32>,
}

fn required(value: Option<String>) -> ApiResult<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::BadRequest(MISSING_FIELDS_MESSAGE.to_string())),
    }
}

impl CreateTimerRequest {
    /// Build the full record to store, applying defaults.
    ///
    /// `startTime` is only set when the resulting status is `running`.
    pub fn into_timer(self, now_ms: i64) -> ApiResult<Timer> {
        let user_id = required(self.user_id)?;
        let timer_id = required(self.timer_id)?;
        let creation_id = required(self.creation_id)?;

        let duration = self.duration.unwrap_or(0);
        let status = self.status.unwrap_or(TimerStatus::Running);
        let start_time = if status == TimerStatus::Running {
            now_ms
        } else {
            0
        };

        Ok(Timer {
            id: timer_id,
            user_id,
            creation_id,
            duration,
            label: self.label.unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            start_time,
            remaining: self.remaining.unwrap_or(duration),
            status,
            step_index: self.step_index,
            version: 0,
        })
    }
}

/// Response carrying a single timer
#[derive(Debug, Serialize)]
pub struct TimerResponse {
    pub ok: bool,
    pub timer: Timer,
}

/// Response carrying all timers of a user
#[derive(Debug, Serialize)]
pub struct TimerListResponse {
    pub ok: bool,
    pub timers: Vec<Timer>,
}

/// Body of `POST /api/v2/timers/detect`
#[derive(Debug, Clone, Deserialize)]
pub struct DetectRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub ok: bool,
    pub timer: Option<DetectedTimer>,
}
