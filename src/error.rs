//! Error types for connection, framing and streaming operations.
//!
//! Every fallible operation in this crate returns [`ConnectionError`]. The variants follow
//! the failure taxonomy higher-level RFIC drivers already reason about:
//!
//! - **Disconnected**: the transport was never established or went away
//! - **Unsupported**: the capability or SPI index does not exist on this hardware
//! - **Failed**: transport I/O failed, or the device refused a command
//! - **FrameTooLarge / MalformedFrame**: codec-level framing violations
//! - **Timeout**: a blocking call exceeded its deadline
//!
//! Framing errors signal a protocol mismatch and are never retried internally. Retry
//! policy, if any, belongs to the caller:
//!
//! ```rust
//! use rfic_link::{ConnectionError, OperationStatus};
//!
//! let error = ConnectionError::unsupported("SPI index 7");
//! assert!(!error.is_retryable());
//! assert_eq!(error.operation_status(), OperationStatus::Unsupported);
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::protocol::{Command, CommandStatus};
use crate::types::{OperationStatus, TransferStatus};

/// Result type alias for connection operations.
pub type Result<T, E = ConnectionError> = std::result::Result<T, E>;

/// Main error type for connection operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("Connection is not open")]
    Disconnected,

    #[error("{capability} is not supported by this device")]
    Unsupported { capability: String },

    #[error("Transfer failed: {reason}")]
    Failed {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Payload of {len} bytes exceeds the {dialect} limit of {max} bytes")]
    FrameTooLarge { dialect: &'static str, len: usize, max: usize },

    #[error("Malformed {dialect} frame: {details}")]
    MalformedFrame { dialect: &'static str, details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Device answered command {command} with status {status}")]
    CommandRejected { command: Command, status: CommandStatus },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Configuration error: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectionError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectionError::Timeout { .. } => true,
            ConnectionError::Failed { .. } => true,
            ConnectionError::CommandRejected { status, .. } => *status == CommandStatus::Busy,
            ConnectionError::Disconnected => false,
            ConnectionError::Unsupported { .. } => false,
            ConnectionError::FrameTooLarge { .. } => false,
            ConnectionError::MalformedFrame { .. } => false,
            ConnectionError::InvalidArgument { .. } => false,
            ConnectionError::Config { .. } => false,
        }
    }

    /// Collapse the error into the coarse status reported by control-plane calls.
    pub fn operation_status(&self) -> OperationStatus {
        match self {
            ConnectionError::Disconnected => OperationStatus::Disconnected,
            ConnectionError::Unsupported { .. } => OperationStatus::Unsupported,
            _ => OperationStatus::Failed,
        }
    }

    /// Collapse the error into the legacy packet-transfer status.
    pub fn transfer_status(&self) -> TransferStatus {
        match self {
            ConnectionError::Disconnected => TransferStatus::NotConnected,
            _ => TransferStatus::TransferFailed,
        }
    }

    /// Negative error code used where a byte count or an error shares one integer.
    pub fn code(&self) -> i32 {
        match self {
            ConnectionError::Disconnected => -1,
            ConnectionError::Timeout { .. } => -2,
            ConnectionError::Unsupported { .. } => -3,
            ConnectionError::FrameTooLarge { .. } | ConnectionError::MalformedFrame { .. } => -4,
            ConnectionError::InvalidArgument { .. } | ConnectionError::Config { .. } => -5,
            ConnectionError::Failed { .. } | ConnectionError::CommandRejected { .. } => -6,
        }
    }

    /// Helper constructor for unsupported capabilities.
    pub fn unsupported(capability: impl Into<String>) -> Self {
        ConnectionError::Unsupported { capability: capability.into() }
    }

    /// Helper constructor for failures without an I/O source.
    pub fn failed(reason: impl Into<String>) -> Self {
        ConnectionError::Failed { reason: reason.into(), source: None }
    }

    /// Helper constructor for malformed frames.
    pub fn malformed(dialect: &'static str, details: impl Into<String>) -> Self {
        ConnectionError::MalformedFrame { dialect, details: details.into() }
    }

    /// Helper constructor for invalid caller arguments.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        ConnectionError::InvalidArgument { reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        ConnectionError::Config { reason: reason.into(), source: None }
    }

    /// Map a transport error, keeping timeouts distinguishable from hard failures.
    pub fn from_transport(context: &str, err: std::io::Error, timeout: Duration) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ConnectionError::Timeout { duration: timeout }
            }
            std::io::ErrorKind::NotConnected | std::io::ErrorKind::BrokenPipe => {
                ConnectionError::Disconnected
            }
            _ => ConnectionError::Failed { reason: context.to_string(), source: Some(err) },
        }
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        ConnectionError::Failed { reason: "transport I/O".to_string(), source: Some(err) }
    }
}

impl From<serde_yaml_ng::Error> for ConnectionError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ConnectionError::Config {
            reason: "YAML profile could not be parsed".to_string(),
            source: Some(Box::new(err)),
        }
    }
}
