//! Persisted timer record
//!
//! Timers are stored as JSON strings under `timer:{userId}:{timerId}`.
//! While a timer is running its `remaining` field holds the value at
//! `startTime`; the live value is derived from wall-clock time.

use serde::{Deserialize, Serialize};

use crate::protocol::TimerDelta;

/// Default time-to-live for stored timers (7 days)
pub const TIMER_TTL_SECONDS: u64 = 60 * 60 * 24 * 7;

/// Label used when a timer is created without one
pub const DEFAULT_LABEL: &str = "Timer";

/// Timer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Running,
    Paused,
    Completed,
}

impl std::fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
            TimerStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Timer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: String,
    /// Anonymous identifier generated by the client
    pub user_id: String,
    /// Recipe or how-to the timer belongs to
    pub creation_id: String,
    /// Total length in seconds
    pub duration: u64,
    pub label: String,
    /// Epoch milliseconds of the last transition to `running`
    pub start_time: i64,
    /// Seconds left at `start_time`
    pub remaining: u64,
    pub status: TimerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    /// Bumped by every read-modify-write
    #[serde(default)]
    pub version: u64,
}

impl Timer {
    /// Store key of this timer
    pub fn key(&self) -> String {
        timer_key(&self.user_id, &self.id)
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// Remaining seconds at `now_ms`.
    ///
    /// Returns `remaining` verbatim unless the timer is running, in which
    /// case whole elapsed seconds since `start_time` are subtracted,
    /// saturating at zero. A `start_time` in the future counts as no
    /// elapsed time.
    pub fn remaining_at(&self, now_ms: i64) -> u64 {
        if self.status != TimerStatus::Running {
            return self.remaining;
        }

        let elapsed_secs = (now_ms - self.start_time).max(0) as u64 / 1000;
        self.remaining.saturating_sub(elapsed_secs)
    }

    /// Epoch milliseconds at which a running timer reaches zero
    pub fn fire_at(&self) -> Option<i64> {
        if self.status != TimerStatus::Running {
            return None;
        }

        let remaining_ms = i64::try_from(self.remaining.saturating_mul(1000)).unwrap_or(i64::MAX);
        Some(self.start_time.saturating_add(remaining_ms))
    }

    /// Copy of the record with `remaining` recomputed at `now_ms`
    pub fn snapshot(&self, now_ms: i64) -> Timer {
        Timer {
            remaining: self.remaining_at(now_ms),
            ..self.clone()
        }
    }

    /// Delta frame entry describing the timer at `now_ms`
    pub fn delta(&self, now_ms: i64) -> TimerDelta {
        TimerDelta {
            id: self.id.clone(),
            remaining: self.remaining_at(now_ms),
            status: self.status,
        }
    }
}

/// Partial timer update, merged field by field over a stored record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerPatch {
    pub creation_id: Option<String>,
    pub duration: Option<u64>,
    pub label: Option<String>,
    pub start_time: Option<i64>,
    pub remaining: Option<u64>,
    pub status: Option<TimerStatus>,
    pub step_index: Option<Option<u32>>,
}

impl TimerPatch {
    pub fn status(mut self, status: TimerStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn remaining(mut self, remaining: u64) -> Self {
        self.remaining = Some(remaining);
        self
    }

    pub fn start_time(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Merge the set fields into `timer`
    pub fn apply(&self, timer: &mut Timer) {
        if let Some(creation_id) = &self.creation_id {
            timer.creation_id = creation_id.clone();
        }
        if let Some(duration) = self.duration {
            timer.duration = duration;
        }
        if let Some(label) = &self.label {
            timer.label = label.clone();
        }
        if let Some(start_time) = self.start_time {
            timer.start_time = start_time;
        }
        if let Some(remaining) = self.remaining {
            timer.remaining = remaining;
        }
        if let Some(status) = self.status {
            timer.status = status;
        }
        if let Some(step_index) = self.step_index {
            timer.step_index = step_index;
        }
    }
}

/// Store key for a user's timer
pub fn timer_key(user_id: &str, timer_id: &str) -> String {
    format!("timer:{}:{}", user_id, timer_id)
}

/// Key prefix shared by all timers of a user
pub fn user_prefix(user_id: &str) -> String {
    format!("timer:{}:", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(remaining: u64, start_time: i64) -> Timer {
        Timer {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            creation_id: "c1".to_string(),
            duration: 60,
            label: "Boil".to_string(),
            start_time,
            remaining,
            status: TimerStatus::Running,
            step_index: None,
            version: 0,
        }
    }

    #[test]
    fn test_remaining_counts_whole_seconds() {
        let timer = running(60, 1_000_000);
        assert_eq!(timer.remaining_at(1_000_000), 60);
        assert_eq!(timer.remaining_at(1_000_999), 60);
        assert_eq!(timer.remaining_at(1_005_000), 55);
        assert_eq!(timer.remaining_at(1_005_999), 55);
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let timer = running(10, 0);
        assert_eq!(timer.remaining_at(10_000), 0);
        assert_eq!(timer.remaining_at(3_600_000), 0);
    }

    #[test]
    fn test_remaining_is_verbatim_when_not_running() {
        let mut timer = running(42, 0);
        timer.status = TimerStatus::Paused;
        assert_eq!(timer.remaining_at(1_000_000), 42);

        timer.status = TimerStatus::Completed;
        timer.remaining = 7;
        assert_eq!(timer.remaining_at(1_000_000), 7);
    }

    #[test]
    fn test_future_start_time_counts_no_elapsed_time() {
        let timer = running(30, 10_000);
        assert_eq!(timer.remaining_at(5_000), 30);
    }

    #[test]
    fn test_fire_at_only_for_running_timers() {
        let mut timer = running(60, 1_000);
        assert_eq!(timer.fire_at(), Some(61_000));
        assert_eq!(timer.remaining_at(61_000), 0);

        timer.status = TimerStatus::Paused;
        assert_eq!(timer.fire_at(), None);
    }

    #[test]
    fn test_serializes_camel_case_without_missing_step_index() {
        let timer = running(60, 1_000);
        let value = serde_json::to_value(&timer).unwrap();

        assert_eq!(value["userId"], "u1");
        assert_eq!(value["creationId"], "c1");
        assert_eq!(value["startTime"], 1_000);
        assert_eq!(value["status"], "running");
        assert!(value.get("stepIndex").is_none());
    }

    #[test]
    fn test_decodes_record_without_version() {
        let json = r#"{"id":"t1","userId":"u1","creationId":"c1","duration":60,
            "label":"Boil","startTime":0,"remaining":60,"status":"paused","stepIndex":2}"#;
        let timer: Timer = serde_json::from_str(json).unwrap();

        assert_eq!(timer.version, 0);
        assert_eq!(timer.step_index, Some(2));
        assert_eq!(timer.status, TimerStatus::Paused);
    }

    #[test]
    fn test_patch_merges_only_set_fields() {
        let mut timer = running(60, 1_000);
        TimerPatch::default()
            .status(TimerStatus::Completed)
            .remaining(0)
            .apply(&mut timer);

        assert_eq!(timer.status, TimerStatus::Completed);
        assert_eq!(timer.remaining, 0);
        assert_eq!(timer.label, "Boil");
        assert_eq!(timer.start_time, 1_000);
    }

    #[test]
    fn test_keys() {
        assert_eq!(timer_key("u1", "t1"), "timer:u1:t1");
        assert!(timer_key("u1", "t1").starts_with(&user_prefix("u1")));
    }
}
