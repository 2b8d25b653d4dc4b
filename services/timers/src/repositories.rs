//! Repositories for key-value store operations

pub mod timer;

pub use timer::{Modification, TimerRepository, calculate_remaining};
