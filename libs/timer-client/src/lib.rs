//! Client-side mirror of the Halogen timer service
//!
//! Keeps a local countdown per recipe timer, sounds the alarm when one
//! finishes and reconciles with the frames pushed by the server.

pub mod alarm;
pub mod board;
pub mod error;
pub mod rest;
pub mod sync;

pub use alarm::{AlarmSink, SilentAlarm};
pub use board::{LocalStatus, LocalTimer, PersistedTimer, TimerBoard};
pub use error::{ClientError, ClientResult};
pub use rest::{TimerUpload, TimersClient};
pub use sync::{ReconnectPolicy, ServerSync, SyncEvent};
