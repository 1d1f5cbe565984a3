//! Coarse status codes for callers that only branch on the outcome class

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Outcome of a control-plane operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Success,
    Failed,
    Unsupported,
    Disconnected,
}

impl<T> From<&Result<T>> for OperationStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => OperationStatus::Success,
            Err(err) => err.operation_status(),
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationStatus::Success => "SUCCESS",
            OperationStatus::Failed => "FAILED",
            OperationStatus::Unsupported => "UNSUPPORTED",
            OperationStatus::Disconnected => "DISCONNECTED",
        };
        f.write_str(label)
    }
}

/// Outcome of a single packet transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    TransferSuccess,
    TransferFailed,
    NotConnected,
}

impl<T> From<&Result<T>> for TransferStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => TransferStatus::TransferSuccess,
            Err(err) => err.transfer_status(),
        }
    }
}
