//! Custom error types for the application.
//!
//! This module defines the primary error type, `PlateError`, for the library.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the kinds of errors that can occur, from configuration issues to serial transport
//! problems and setup-file mismatches.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: loading failures from `figment` and semantic
//!   validation failures of the loaded [`Settings`](crate::config::Settings).
//! - **`Io`**: wraps `std::io::Error` for log and setup file access.
//! - **`SerialPortNotFound`**: fatal at startup; no serial device carries the bridge's
//!   vendor/product id pair.
//! - **`TransportTimeout`** / **`Transport`**: a command that did not complete. Callers
//!   sampling a channel treat both as "no data" rather than failing the tick.
//! - **`HardwareMismatch`** / **`SetupFormat`** / **`UnsafeLabel`**: recoverable setup-file
//!   problems. Nothing is mutated when one of these is returned.
//! - **`LogFileNotSelected`** / **`AlreadyLogging`** / **`InvalidSampleCount`**: user-input
//!   validation on the acquisition session.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, PlateError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum PlateError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No serial port found with vendor id {vendor_id} and product id {product_id}")]
    SerialPortNotFound {
        vendor_id: String,
        product_id: String,
    },

    #[error("Failed to open serial port '{port}': {reason}")]
    SerialPortOpen { port: String, reason: String },

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Timed out waiting for response to '{command}' (partial response: {partial:?})")]
    TransportTimeout { command: String, partial: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Setup file does not match the attached hardware")]
    HardwareMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Malformed setup file: {0}")]
    SetupFormat(String),

    #[error("Label of {channel} contains a comma or line break: {label:?}")]
    UnsafeLabel { channel: String, label: String },

    #[error("A log file must be selected before logging can start")]
    LogFileNotSelected,

    #[error("Logging is already in progress")]
    AlreadyLogging,

    #[error("Invalid sample count '{0}': must be a positive integer")]
    InvalidSampleCount(String),
}

impl From<figment::Error> for PlateError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl PlateError {
    /// Whether this error means a read produced no usable data, as opposed to a
    /// failure the caller has to act on.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::TransportTimeout { .. } | Self::Transport(_))
    }
}
