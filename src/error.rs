//! Error types for mtcopy
//!
//! This module defines the failure taxonomy of a transfer call and the
//! coarse outcome classification callers use to decide on retries.

use serde::Serialize;
use thiserror::Error;

/// Main error type for transfer operations
#[derive(Error, Debug)]
pub enum TransferError {
    /// Mismatched list lengths, unit sizes, or an unsplittable unit
    #[error("Invalid transfer input: {0}")]
    InvalidInput(String),

    /// No candidate node has a usable CPU
    #[error("No usable CPU on any candidate node {candidates:?}")]
    NoUsableTopology { candidates: Vec<usize> },

    /// Allocation of worker plans or worker threads failed
    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    /// One or more copy instructions failed at the platform level
    #[error(
        "Partial failure: {failed_workers} worker(s) reported {failed_items} failed item(s), {bytes_failed} bytes not copied"
    )]
    PartialFailure {
        failed_workers: usize,
        failed_items: usize,
        bytes_failed: u64,
    },

    /// Scoped thread machinery failed outside of any copy loop
    ///
    /// Workers that never delivered a report may have left their
    /// destination ranges unwritten, so this classifies as a partial failure.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A report could not be encoded
    #[error("Report error: {0}")]
    Report(String),
}

impl TransferError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a resource exhaustion error
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the caller may retry the whole call
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_) | Self::PartialFailure { .. })
    }

    /// Classify this error into a transfer outcome
    ///
    /// Errors raised outside the copy itself (bad tunables, report encoding)
    /// count as caller errors. `ThreadPool` counts as a partial failure
    /// because some destination ranges may not have been written.
    pub fn outcome(&self) -> TransferOutcome {
        match self {
            Self::InvalidInput(_) | Self::Config(_) | Self::Report(_) => {
                TransferOutcome::InvalidInput
            }
            Self::NoUsableTopology { .. } => TransferOutcome::NoUsableTopology,
            Self::ResourceExhausted(_) => TransferOutcome::ResourceExhausted,
            Self::PartialFailure { .. } | Self::ThreadPool(_) => TransferOutcome::PartialFailure,
        }
    }
}

/// Coarse result of a transfer call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    /// Every byte was copied
    Success,
    /// Some copy instructions failed; retrying the call may succeed
    PartialFailure,
    /// Caller bug, never retried
    InvalidInput,
    /// Operator intervention needed
    NoUsableTopology,
    /// Transient; retry later
    ResourceExhausted,
}

impl TransferOutcome {
    /// Classify any transfer result
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.outcome(),
        }
    }
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

impl From<std::collections::TryReserveError> for TransferError {
    fn from(err: std::collections::TryReserveError) -> Self {
        TransferError::ResourceExhausted(err.to_string())
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Report(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryability() {
        let partial = TransferError::PartialFailure {
            failed_workers: 1,
            failed_items: 2,
            bytes_failed: 512,
        };
        assert!(partial.is_retryable());
        assert!(TransferError::exhausted("plan").is_retryable());

        assert!(!TransferError::invalid("length mismatch").is_retryable());
        assert!(!TransferError::NoUsableTopology { candidates: vec![0] }.is_retryable());
    }

    #[test]
    fn test_outcome_classification() {
        let ok: Result<()> = Ok(());
        assert_eq!(TransferOutcome::of(&ok), TransferOutcome::Success);

        let err: Result<()> = Err(TransferError::NoUsableTopology { candidates: vec![1, 0] });
        assert_eq!(TransferOutcome::of(&err), TransferOutcome::NoUsableTopology);

        assert_eq!(
            TransferError::config("max_workers must be at least 1").outcome(),
            TransferOutcome::InvalidInput
        );
        assert_eq!(
            TransferError::ThreadPool("1 of 4 workers exited without a report".into()).outcome(),
            TransferOutcome::PartialFailure
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let err: TransferError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert!(matches!(err, TransferError::Report(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_try_reserve_conversion() {
        let mut v: Vec<u64> = Vec::new();
        let err: TransferError = v.try_reserve(usize::MAX).unwrap_err().into();
        assert!(matches!(err, TransferError::ResourceExhausted(_)));
    }
}
