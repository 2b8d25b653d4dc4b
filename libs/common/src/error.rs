//! Custom error types for the common library
//!
//! This module defines the error type returned by the key-value store and
//! the timer records kept in it.

use thiserror::Error;

/// Custom error type for key-value store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error reported by the Redis server or connection
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested timer does not exist (or has expired)
    #[error("Timer not found")]
    NotFound,

    /// A compare-and-set update kept losing against concurrent writers
    #[error("Concurrent update conflict on key {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Store configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;
