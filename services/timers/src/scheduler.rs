//! Server-side timer expiry
//!
//! Running timers are registered with their fire time in a min-heap. A
//! background task sleeps until the earliest deadline, completes the timer
//! in the store and publishes the transition, so timers finish even when no
//! client is connected. The queue holds at most one live deadline per
//! timer: a new registration supersedes the previous one, pausing or
//! deleting a timer cancels it, and deadlines beyond the store TTL are not
//! kept because the record expires first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use common::error::StoreError;
use common::timer::{Timer, timer_key};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::events::TimerHub;
use crate::repositories::TimerRepository;

/// Superseded heap entries tolerated before the heap is rebuilt
const COMPACT_SLACK: usize = 64;

/// A timer expected to reach zero at `fire_at`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    pub fire_at: i64,
    pub user_id: String,
    pub timer_id: String,
}

impl Deadline {
    fn key(&self) -> String {
        timer_key(&self.user_id, &self.timer_id)
    }
}

/// Min-heap of deadlines ordered by fire time, one live entry per timer
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: BinaryHeap<Reverse<Deadline>>,
    /// Live fire time per timer key; heap entries that disagree are stale
    live: HashMap<String, i64>,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `deadline`, replacing any earlier one for the same timer
    pub fn schedule(&mut self, deadline: Deadline) {
        if self.live.insert(deadline.key(), deadline.fire_at) == Some(deadline.fire_at) {
            return;
        }

        self.heap.push(Reverse(deadline));
        self.compact();
    }

    /// Forget the deadline of a timer, if any
    pub fn cancel(&mut self, user_id: &str, timer_id: &str) {
        if self.live.remove(&timer_key(user_id, timer_id)).is_some() {
            self.compact();
        }
    }

    /// Remove and return every live deadline due at `now_ms`, earliest first
    pub fn pop_due(&mut self, now_ms: i64) -> Vec<Deadline> {
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.fire_at > now_ms {
                break;
            }
            let Some(Reverse(deadline)) = self.heap.pop() else {
                break;
            };

            let key = deadline.key();
            if self.live.get(&key) == Some(&deadline.fire_at) {
                self.live.remove(&key);
                due.push(deadline);
            }
        }
        self.discard_stale_head();
        due
    }

    /// Fire time of the earliest live deadline
    pub fn next_deadline(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(d)| d.fire_at)
    }

    /// Number of timers with a live deadline
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn is_live(&self, deadline: &Deadline) -> bool {
        self.live.get(&deadline.key()) == Some(&deadline.fire_at)
    }

    fn discard_stale_head(&mut self) {
        while let Some(Reverse(head)) = self.heap.peek() {
            if self.is_live(head) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Drop superseded entries once they outnumber the live ones
    fn compact(&mut self) {
        if self.heap.len() > 2 * self.live.len() + COMPACT_SLACK {
            let live = &self.live;
            self.heap
                .retain(|Reverse(d)| live.get(&d.key()) == Some(&d.fire_at));
        }
        self.discard_stale_head();
    }
}

/// Message from a [`SchedulerHandle`] to the scheduler task
#[derive(Debug)]
enum Registration {
    Schedule(Deadline),
    Cancel { user_id: String, timer_id: String },
}

/// Registers running timers with the scheduler task
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Registration>,
}

impl SchedulerHandle {
    /// Register `timer` if it is running; otherwise drop its deadline
    pub fn schedule(&self, timer: &Timer) {
        let registration = match timer.fire_at() {
            Some(fire_at) => Registration::Schedule(Deadline {
                fire_at,
                user_id: timer.user_id.clone(),
                timer_id: timer.id.clone(),
            }),
            None => Registration::Cancel {
                user_id: timer.user_id.clone(),
                timer_id: timer.id.clone(),
            },
        };
        self.send(registration);
    }

    /// Drop the deadline of a deleted timer
    pub fn cancel(&self, user_id: &str, timer_id: &str) {
        self.send(Registration::Cancel {
            user_id: user_id.to_string(),
            timer_id: timer_id.to_string(),
        });
    }

    fn send(&self, registration: Registration) {
        if self.tx.send(registration).is_err() {
            debug!("Expiry scheduler stopped, registration dropped");
        }
    }
}

/// Background task completing expired timers
pub struct ExpiryScheduler {
    queue: ExpiryQueue,
    rx: mpsc::UnboundedReceiver<Registration>,
    timers: TimerRepository,
    hub: TimerHub,
}

impl ExpiryScheduler {
    pub fn new(timers: TimerRepository, hub: TimerHub) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            queue: ExpiryQueue::new(),
            rx,
            timers,
            hub,
        };

        (scheduler, SchedulerHandle { tx })
    }

    /// Number of timers waiting to expire
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn register(&mut self, registration: Registration) {
        match registration {
            Registration::Schedule(deadline) => {
                let horizon = self
                    .timers
                    .now_ms()
                    .saturating_add(self.timers.ttl_seconds().saturating_mul(1000) as i64);

                if deadline.fire_at > horizon {
                    debug!(
                        "Timer {} fires after its record expires, not scheduled",
                        deadline.timer_id
                    );
                    self.queue.cancel(&deadline.user_id, &deadline.timer_id);
                } else {
                    self.queue.schedule(deadline);
                }
            }
            Registration::Cancel { user_id, timer_id } => self.queue.cancel(&user_id, &timer_id),
        }
    }

    /// Apply registrations waiting in the channel
    pub fn drain_registrations(&mut self) {
        while let Ok(registration) = self.rx.try_recv() {
            self.register(registration);
        }
    }

    /// Complete every timer due at `now_ms`; returns how many were completed
    pub async fn fire_due(&mut self, now_ms: i64) -> usize {
        self.drain_registrations();

        let mut completed = 0;
        for deadline in self.queue.pop_due(now_ms) {
            match self
                .timers
                .complete_if_expired(&deadline.user_id, &deadline.timer_id)
                .await
            {
                Ok(modification) if modification.changed => {
                    info!(
                        "Timer {} of user {} completed",
                        deadline.timer_id, deadline.user_id
                    );
                    let delta = modification.timer.delta(now_ms);
                    self.hub.publish(None, &deadline.user_id, delta);
                    completed += 1;
                }
                Ok(_) => debug!("Stale deadline for timer {}", deadline.timer_id),
                Err(StoreError::NotFound) => {
                    debug!("Timer {} deleted before expiry", deadline.timer_id)
                }
                Err(e) => error!(
                    "Failed to complete timer {} of user {}: {}",
                    deadline.timer_id, deadline.user_id, e
                ),
            }
        }

        completed
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("Starting expiry scheduler");

        loop {
            let now = self.timers.now_ms();
            self.fire_due(now).await;

            let sleep_for = self
                .queue
                .next_deadline()
                .map(|fire_at| Duration::from_millis((fire_at - now).max(0) as u64));

            tokio::select! {
                registration = self.rx.recv() => match registration {
                    Some(registration) => self.register(registration),
                    None => break,
                },
                _ = sleep_until_deadline(sleep_for) => {}
            }
        }

        info!("Expiry scheduler stopped");
    }
}

async fn sleep_until_deadline(sleep_for: Option<Duration>) {
    match sleep_for {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}
