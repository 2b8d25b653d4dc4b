//! Local timer board
//!
//! Counts down recipe timers on the client, one second per [`TimerBoard::tick`],
//! and reconciles with deltas pushed by the server. Snapshots can be
//! persisted and restored across page loads.

use std::collections::BTreeMap;

use common::protocol::TimerDelta;
use common::timer::TimerStatus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alarm::AlarmSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalStatus {
    Idle,
    Running,
    Paused,
    Completed,
    /// Finished and ringing until [`TimerBoard::stop_alarm`]
    Alarming,
}

impl LocalStatus {
    /// Finished, whether or not the alarm is still ringing
    pub fn is_finished(self) -> bool {
        matches!(self, LocalStatus::Completed | LocalStatus::Alarming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTimer {
    pub id: String,
    /// Seconds
    pub duration: u64,
    pub label: String,
    /// Seconds
    pub remaining: u64,
    pub status: LocalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
}

/// Timer as kept in client storage between page loads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimer {
    pub id: String,
    pub label: String,
    pub duration: u64,
    pub remaining: u64,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
}

impl PersistedTimer {
    fn status(&self) -> LocalStatus {
        if self.is_active {
            LocalStatus::Running
        } else if self.remaining == 0 {
            LocalStatus::Completed
        } else if self.remaining < self.duration {
            LocalStatus::Paused
        } else {
            LocalStatus::Idle
        }
    }
}

/// All timers shown on one page
pub struct TimerBoard<A> {
    timers: BTreeMap<String, LocalTimer>,
    alarm: A,
}

impl<A: AlarmSink> TimerBoard<A> {
    pub fn new(alarm: A) -> Self {
        Self {
            timers: BTreeMap::new(),
            alarm,
        }
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }

    pub fn get(&self, id: &str) -> Option<&LocalTimer> {
        self.timers.get(id)
    }

    /// Return the timer `id`, creating it idle if unknown.
    ///
    /// An idle timer picks up a changed duration or label; a timer in use
    /// keeps its own.
    pub fn get_or_create(
        &mut self,
        id: &str,
        duration: u64,
        label: &str,
        step_index: Option<u32>,
    ) -> &LocalTimer {
        let timer = self
            .timers
            .entry(id.to_string())
            .or_insert_with(|| LocalTimer {
                id: id.to_string(),
                duration,
                label: label.to_string(),
                remaining: duration,
                status: LocalStatus::Idle,
                step_index,
            });

        if timer.status == LocalStatus::Idle {
            if timer.duration != duration {
                debug!(
                    "Timer {} duration changed: {}s -> {}s",
                    id, timer.duration, duration
                );
                timer.duration = duration;
                timer.remaining = duration;
            }
            if timer.label != label {
                timer.label = label.to_string();
            }
        }

        timer
    }

    /// Start a timer; a completed timer restarts from its full duration
    pub fn start(&mut self, id: &str) -> bool {
        let Some(timer) = self.timers.get_mut(id) else {
            return false;
        };
        if timer.status == LocalStatus::Running {
            return false;
        }

        if timer.status == LocalStatus::Alarming {
            self.alarm.stop(id);
        }
        if timer.status.is_finished() {
            timer.remaining = timer.duration;
        }
        timer.status = LocalStatus::Running;
        true
    }

    pub fn pause(&mut self, id: &str) -> bool {
        self.transition(id, LocalStatus::Running, LocalStatus::Paused)
    }

    pub fn resume(&mut self, id: &str) -> bool {
        self.transition(id, LocalStatus::Paused, LocalStatus::Running)
    }

    fn transition(&mut self, id: &str, from: LocalStatus, to: LocalStatus) -> bool {
        match self.timers.get_mut(id) {
            Some(timer) if timer.status == from => {
                timer.status = to;
                true
            }
            _ => false,
        }
    }

    /// Back to idle with the full duration
    pub fn reset(&mut self, id: &str) -> bool {
        let Some(timer) = self.timers.get_mut(id) else {
            return false;
        };
        if timer.status == LocalStatus::Alarming {
            self.alarm.stop(id);
        }
        timer.remaining = timer.duration;
        timer.status = LocalStatus::Idle;
        true
    }

    /// Silence a ringing timer and drop it from the board
    pub fn stop_alarm(&mut self, id: &str) -> Option<LocalTimer> {
        if self.status(id) != LocalStatus::Alarming {
            return None;
        }

        self.alarm.stop(id);
        let mut timer = self.timers.remove(id)?;
        timer.status = LocalStatus::Completed;
        Some(timer)
    }

    /// Whether any timer is ringing
    pub fn is_alarming(&self) -> bool {
        self.timers
            .values()
            .any(|timer| timer.status == LocalStatus::Alarming)
    }

    pub fn add_minute(&mut self, id: &str) -> bool {
        let Some(timer) = self.timers.get_mut(id) else {
            return false;
        };
        timer.remaining += 60;
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<LocalTimer> {
        self.timers.remove(id)
    }

    /// Status of `id`; unknown timers are idle
    pub fn status(&self, id: &str) -> LocalStatus {
        self.timers
            .get(id)
            .map_or(LocalStatus::Idle, |timer| timer.status)
    }

    /// Remaining seconds of `id`; unknown timers have none
    pub fn remaining(&self, id: &str) -> u64 {
        self.timers.get(id).map_or(0, |timer| timer.remaining)
    }

    pub fn has_active_timers(&self) -> bool {
        self.timers
            .values()
            .any(|timer| timer.status != LocalStatus::Idle)
    }

    /// Advance every running timer by one second.
    ///
    /// Returns the ids that finished on this tick; each starts alarming
    /// until [`TimerBoard::stop_alarm`].
    pub fn tick(&mut self) -> Vec<String> {
        let mut finished = Vec::new();

        for timer in self.timers.values_mut() {
            if timer.status != LocalStatus::Running {
                continue;
            }

            timer.remaining = timer.remaining.saturating_sub(1);
            if timer.remaining == 0 {
                timer.status = LocalStatus::Alarming;
                finished.push(timer.id.clone());
            }
        }

        for id in &finished {
            self.alarm.play(id);
        }

        finished
    }

    /// Take over remaining time and status pushed by the server.
    ///
    /// Unknown ids are ignored. A completion already seen locally does not
    /// sound the alarm again. Returns the ids newly completed.
    pub fn apply_server_deltas(&mut self, deltas: &[TimerDelta]) -> Vec<String> {
        let mut finished = Vec::new();

        for delta in deltas {
            let Some(timer) = self.timers.get_mut(&delta.id) else {
                continue;
            };

            timer.remaining = delta.remaining;
            match delta.status {
                TimerStatus::Running => timer.status = LocalStatus::Running,
                TimerStatus::Paused => timer.status = LocalStatus::Paused,
                TimerStatus::Completed => {
                    timer.remaining = 0;
                    if !timer.status.is_finished() {
                        timer.status = LocalStatus::Alarming;
                        finished.push(timer.id.clone());
                    }
                }
            }
        }

        for id in &finished {
            self.alarm.play(id);
        }

        finished
    }

    /// Replace the board with persisted timers
    pub fn restore(&mut self, persisted: impl IntoIterator<Item = PersistedTimer>) {
        for saved in persisted {
            let status = saved.status();
            self.timers.insert(
                saved.id.clone(),
                LocalTimer {
                    id: saved.id,
                    duration: saved.duration,
                    label: saved.label,
                    remaining: saved.remaining,
                    status,
                    step_index: saved.step_index,
                },
            );
        }
    }

    /// Persistable form of every timer
    pub fn snapshots(&self) -> Vec<PersistedTimer> {
        self.timers
            .values()
            .map(|timer| PersistedTimer {
                id: timer.id.clone(),
                label: timer.label.clone(),
                duration: timer.duration,
                remaining: timer.remaining,
                is_active: timer.status == LocalStatus::Running,
                step_index: timer.step_index,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
