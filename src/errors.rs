//! Error types for the resource pool

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    Configuration(String),

    #[error("Pool '{pool}' failed to create a resource: {message}")]
    Creation { pool: String, message: String },

    #[error("Pool '{pool}' could not admit user '{user}' within {timeout:?}")]
    AdmissionTimeout {
        pool: String,
        user: String,
        timeout: Duration,
    },

    #[error("Pool '{pool}' is shutting down")]
    ShuttingDown { pool: String },

    #[error("Pool invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Handle is closed")]
    HandleClosed,

    #[error("Handle is already initialized for user '{0}'")]
    AlreadyInitialized(String),

    #[error("Checkout by user '{user}' on pool '{pool}' was cancelled")]
    Cancelled { pool: String, user: String },

    #[error("No pool named '{0}' is registered")]
    UnknownPool(String),
}

impl PoolError {
    /// True for errors that signal an overloaded pool rather than a broken one.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::AdmissionTimeout { .. })
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
