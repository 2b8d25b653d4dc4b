//! Application state shared across handlers

use std::time::Duration;

use crate::events::TimerHub;
use crate::repositories::TimerRepository;
use crate::scheduler::SchedulerHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub timers: TimerRepository,
    pub hub: TimerHub,
    pub scheduler: SchedulerHandle,
    /// Interval between WebSocket update frames
    pub tick_interval: Duration,
}
