//! Common library for the Halogen timer services
//!
//! This crate provides functionality shared by the timer service and its
//! clients: key-value store connectivity, the persisted timer record, the
//! WebSocket frame types and the store error type.

pub mod cache;
pub mod error;
pub mod protocol;
pub mod timer;
