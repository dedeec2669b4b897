//! Device read errors.

use std::time::Duration;

use thiserror::Error;

/// Result type for device operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Failure of one variable's unit of work. Never fatal beyond that variable.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Endpoint could not be resolved or connected.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The session did not finish in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The device answered with a protocol exception.
    #[error("Device exception: {0}")]
    Exception(String),

    /// Malformed or unexpected response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The request cannot be sent as configured.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Writing the reading failed.
    #[error("Sink error: {0}")]
    Sink(#[from] shiplog_storage::Error),
}
