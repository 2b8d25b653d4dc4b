//! Timer repository for key-value store operations
//!
//! Every record is stored as a JSON string under `timer:{userId}:{timerId}`
//! with the configured TTL, refreshed on each write. Read-modify-write
//! updates go through compare-and-set so concurrent writers (tick loops,
//! commands, the expiry scheduler, REST upserts) cannot silently overwrite
//! each other.

use common::cache::KvStore;
use common::error::{StoreError, StoreResult};
use common::timer::{Timer, TimerPatch, TimerStatus, timer_key, user_prefix};
use tracing::{debug, warn};

use crate::clock::SharedClock;

/// Attempts made by a read-modify-write before giving up
const MAX_UPDATE_ATTEMPTS: usize = 5;

/// Remaining seconds of `timer` at `now_ms`
pub fn calculate_remaining(timer: &Timer, now_ms: i64) -> u64 {
    timer.remaining_at(now_ms)
}

/// Outcome of a conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// The record as stored after the call
    pub timer: Timer,
    /// Whether this call wrote the record
    pub changed: bool,
}

/// Timer repository for key-value store operations
#[derive(Clone)]
pub struct TimerRepository {
    store: KvStore,
    clock: SharedClock,
    ttl_seconds: u64,
}

impl TimerRepository {
    /// Create a new timer repository
    pub fn new(store: KvStore, clock: SharedClock, ttl_seconds: u64) -> Self {
        Self {
            store,
            clock,
            ttl_seconds,
        }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Lifetime of a stored record, refreshed on each write
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Remaining seconds of `timer` right now
    pub fn calculate_remaining(&self, timer: &Timer) -> u64 {
        calculate_remaining(timer, self.now_ms())
    }

    /// Upsert the complete record
    pub async fn store_timer(&self, timer: &Timer) -> StoreResult<()> {
        let value = serde_json::to_string(timer)?;
        self.store
            .set(&timer.key(), &value, Some(self.ttl_seconds))
            .await
    }

    /// Get a timer by user and id
    pub async fn get_timer(&self, user_id: &str, timer_id: &str) -> StoreResult<Option<Timer>> {
        match self.store.get(&timer_key(user_id, timer_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Get all timers of a user, ordered by key
    pub async fn get_user_timers(&self, user_id: &str) -> StoreResult<Vec<Timer>> {
        let keys = self.store.keys(&user_prefix(user_id)).await?;

        let mut timers = Vec::with_capacity(keys.len());
        for key in keys {
            // The key may expire between the scan and the read
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };

            match serde_json::from_str::<Timer>(&raw) {
                Ok(timer) => timers.push(timer),
                Err(e) => warn!("Skipping undecodable timer record {}: {}", key, e),
            }
        }

        Ok(timers)
    }

    /// Merge `patch` into the stored timer
    pub async fn update_timer(
        &self,
        user_id: &str,
        timer_id: &str,
        patch: TimerPatch,
    ) -> StoreResult<Timer> {
        let modification = self
            .modify_timer(user_id, timer_id, |timer, _| {
                patch.apply(timer);
                true
            })
            .await?;

        Ok(modification.timer)
    }

    /// Conditionally change the stored timer.
    ///
    /// `f` receives the current record and the current time and returns
    /// whether it changed the record. The write only succeeds if nobody
    /// else wrote the key since it was read; otherwise `f` runs again on
    /// the fresh record.
    pub async fn modify_timer<F>(
        &self,
        user_id: &str,
        timer_id: &str,
        mut f: F,
    ) -> StoreResult<Modification>
    where
        F: FnMut(&mut Timer, i64) -> bool,
    {
        let key = timer_key(user_id, timer_id);

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let raw = self.store.get(&key).await?.ok_or(StoreError::NotFound)?;
            let mut timer: Timer = serde_json::from_str(&raw)?;

            if !f(&mut timer, self.now_ms()) {
                return Ok(Modification {
                    timer: serde_json::from_str(&raw)?,
                    changed: false,
                });
            }

            timer.version += 1;
            let value = serde_json::to_string(&timer)?;
            if self
                .store
                .compare_and_set(&key, &raw, &value, Some(self.ttl_seconds))
                .await?
            {
                return Ok(Modification {
                    timer,
                    changed: true,
                });
            }

            debug!(
                "Concurrent write on {} (attempt {}/{}), retrying",
                key, attempt, MAX_UPDATE_ATTEMPTS
            );
        }

        Err(StoreError::Conflict(key))
    }

    /// Pause a timer, freezing its live remaining time
    pub async fn pause_timer(&self, user_id: &str, timer_id: &str) -> StoreResult<Modification> {
        self.modify_timer(user_id, timer_id, |timer, now| {
            timer.remaining = timer.remaining_at(now);
            timer.status = TimerStatus::Paused;
            true
        })
        .await
    }

    /// Resume a timer from its stored remaining time.
    ///
    /// Resuming a timer that is already running leaves it untouched, so the
    /// elapsed time is not lost.
    pub async fn resume_timer(&self, user_id: &str, timer_id: &str) -> StoreResult<Modification> {
        self.modify_timer(user_id, timer_id, |timer, now| {
            if timer.status == TimerStatus::Running {
                return false;
            }
            timer.status = TimerStatus::Running;
            timer.start_time = now;
            true
        })
        .await
    }

    /// Mark a timer completed with nothing remaining
    pub async fn complete_timer(&self, user_id: &str, timer_id: &str) -> StoreResult<Modification> {
        self.modify_timer(user_id, timer_id, |timer, _| {
            if timer.status == TimerStatus::Completed && timer.remaining == 0 {
                return false;
            }
            timer.status = TimerStatus::Completed;
            timer.remaining = 0;
            true
        })
        .await
    }

    /// Complete a running timer whose remaining time has reached zero.
    ///
    /// Only one caller observes `changed == true` for a given expiry.
    pub async fn complete_if_expired(
        &self,
        user_id: &str,
        timer_id: &str,
    ) -> StoreResult<Modification> {
        self.modify_timer(user_id, timer_id, |timer, now| {
            if timer.status != TimerStatus::Running || timer.remaining_at(now) > 0 {
                return false;
            }
            timer.status = TimerStatus::Completed;
            timer.remaining = 0;
            true
        })
        .await
    }

    /// Delete a timer; deleting a missing timer succeeds
    pub async fn delete_timer(&self, user_id: &str, timer_id: &str) -> StoreResult<()> {
        self.store.delete(&timer_key(user_id, timer_id)).await
    }
}
