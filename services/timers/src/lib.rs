//! Halogen timer service
//!
//! Per-user recipe timers kept in a key-value store, exposed over REST and
//! pushed to browsers over a WebSocket.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod labels;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod ws;

use common::cache::KvStore;

use crate::clock::SharedClock;
use crate::config::Settings;
use crate::events::TimerHub;
use crate::repositories::TimerRepository;
use crate::scheduler::ExpiryScheduler;
use crate::state::AppState;

/// Wire the shared state over `store`.
///
/// The returned scheduler must be spawned (or driven by hand in tests) for
/// timers to complete without a connected client.
pub fn build_state(
    settings: &Settings,
    store: KvStore,
    clock: SharedClock,
) -> (AppState, ExpiryScheduler) {
    let timers = TimerRepository::new(store, clock, settings.store.ttl_seconds);
    let hub = TimerHub::new();
    let (scheduler, handle) = ExpiryScheduler::new(timers.clone(), hub.clone());

    let state = AppState {
        timers,
        hub,
        scheduler: handle,
        tick_interval: settings.tick_interval(),
    };

    (state, scheduler)
}
