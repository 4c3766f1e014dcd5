//! Custom error types for the application.
//!
//! This module defines the primary error type, `WavefinderError`, for the whole crate.
//! Using the `thiserror` crate, it provides a single, consistent way to report the
//! different kinds of failure that can happen between the operator panels and the
//! hardware, from configuration problems to a controller rejecting a command.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while loading the configuration file or
//!   environment overrides.
//! - **`Configuration`**: Semantic errors in a configuration that parsed correctly
//!   (duplicate axis names, a zero update interval, an unknown channel letter).
//! - **`Io`**: Wraps `std::io::Error` from sockets.
//! - **`ConnectionFailed`**: Opening a controller connection failed. This is the only
//!   fatal error during adapter construction.
//! - **`CommandRejected`**: The controller answered a command with `?`. During axis
//!   discovery this means "channel not present".
//! - **`Timeout`** / **`Protocol`**: The controller did not answer in time, or answered
//!   with something that could not be parsed.
//! - **`Instrument`**: General device-level failures (e.g. a monochromator fault).
//! - **`TasksClosed`** / **`TaskFailed`**: Tracked background operations.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, WavefinderError>;

/// Every error surfaced by the wavefinder library.
#[derive(Error, Debug)]
pub enum WavefinderError {
    /// Loading the configuration sources failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// The configuration loaded but is not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Socket level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not open a connection to a controller.
    #[error("Failed to connect to '{address}': {reason}")]
    ConnectionFailed {
        /// Open string used for the attempt.
        address: String,
        /// Human readable cause.
        reason: String,
    },

    /// The controller refused a command (replied with `?`).
    #[error("Command '{command}' rejected by controller (code {code}: {message})")]
    CommandRejected {
        /// Command as sent, without terminator.
        command: String,
        /// Controller error code, as reported by `TC1`. Zero when unknown.
        code: u16,
        /// Controller error text, as reported by `TC1`.
        message: String,
    },

    /// No reply arrived within the transport timeout.
    #[error("Timed out waiting for reply to '{command}'")]
    Timeout {
        /// Command that was waiting for a reply.
        command: String,
    },

    /// The reply could not be interpreted.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The transport has been closed.
    #[error("Controller not connected")]
    NotConnected,

    /// Device-level failure.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// A task was submitted to a task set after it was closed.
    #[error("Task set is closed; '{0}' was not started")]
    TasksClosed(String),

    /// A tracked task ended with an error or panicked.
    #[error("Task '{label}' failed: {reason}")]
    TaskFailed {
        /// Label given when the task was spawned.
        label: String,
        /// Error text or panic description.
        reason: String,
    },
}

impl WavefinderError {
    /// True for the failures that only concern a single axis probe and must not
    /// abort discovery of the remaining axes.
    pub fn is_per_axis(&self) -> bool {
        matches!(
            self,
            WavefinderError::CommandRejected { .. }
                | WavefinderError::Timeout { .. }
                | WavefinderError::Protocol(_)
        )
    }
}
