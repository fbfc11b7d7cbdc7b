//! Error types for SurgeKV

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using SurgeKV's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SurgeKV
#[derive(Error, Debug)]
pub enum Error {
    // Transaction errors
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    // Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Workload-level errors (transfer integrity checks)
    #[error("Workload error: {0}")]
    Workload(#[from] WorkloadError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a lock acquisition was refused.
///
/// Transmitted as a structured field in Get/Put responses so clients classify
/// retryability without parsing error text. The `Display` form still begins
/// with "Cannot acquire" to keep log output compatible with the historical
/// wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    /// Another transaction holds the write lock on the key.
    WriteLocked,
    /// A single other transaction holds a read lock on the key.
    ReadLockedByOther,
    /// Multiple transactions hold read locks, so no upgrade is possible.
    MultipleReaders,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::WriteLocked => {
                write!(f, "Cannot acquire lock, key is currently write locked")
            }
            ConflictReason::ReadLockedByOther => {
                write!(f, "Cannot acquire lock, key is read locked by another transaction")
            }
            ConflictReason::MultipleReaders => {
                write!(f, "Cannot acquire lock, key has multiple read locks")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum TransactionError {
    /// Another transaction holds an incompatible lock. Retryable.
    #[error("lock conflict: {0}")]
    LockConflict(ConflictReason),

    /// The RPC itself failed, or the server answered with something the
    /// client cannot interpret. Fatal for the current attempt.
    #[error("server-side error raised: {0}")]
    ServerSide(String),

    /// Get/Put/Commit/Abort called without an active transaction.
    #[error("no transaction in progress")]
    NoActiveTxn,

    /// The retry driver exhausted its attempt budget on lock conflicts.
    #[error("giving up after {0} attempts")]
    RetriesExhausted(u32),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("connection closed")]
    ConnectionClosed,
}

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("integrity violation: total balance {actual}, expected {expected}")]
    IntegrityViolation { expected: i64, actual: i64 },

    #[error("insufficient funds in account {account}: {balance}")]
    InsufficientFunds { account: u64, balance: i64 },

    #[error("malformed balance for {key}: {value:?}")]
    MalformedBalance { key: String, value: String },
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the error is a lock conflict that a retry loop should absorb.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(
            self,
            Error::Transaction(TransactionError::LockConflict(_))
        )
    }

    /// Whether the error indicates a serializability bug rather than an
    /// operational failure.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Error::Workload(WorkloadError::IntegrityViolation { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_reason_display_keeps_wire_contract() {
        // Clients historically classified retryability by this substring.
        for reason in [
            ConflictReason::WriteLocked,
            ConflictReason::ReadLockedByOther,
            ConflictReason::MultipleReaders,
        ] {
            assert!(
                reason.to_string().contains("Cannot acquire"),
                "missing contract substring in {reason:?}"
            );
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::Transaction(TransactionError::LockConflict(ConflictReason::WriteLocked));
        assert_eq!(
            err.to_string(),
            "Transaction error: lock conflict: Cannot acquire lock, key is currently write locked"
        );

        let err = Error::Transaction(TransactionError::NoActiveTxn);
        assert_eq!(err.to_string(), "Transaction error: no transaction in progress");
    }

    #[test]
    fn test_is_lock_conflict() {
        let conflict =
            Error::Transaction(TransactionError::LockConflict(ConflictReason::MultipleReaders));
        assert!(conflict.is_lock_conflict());

        let fatal = Error::Transaction(TransactionError::ServerSide("boom".into()));
        assert!(!fatal.is_lock_conflict());

        let io: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(!io.is_lock_conflict());
    }

    #[test]
    fn test_integrity_violation_classification() {
        let err = Error::Workload(WorkloadError::IntegrityViolation {
            expected: 10_000,
            actual: 9_900,
        });
        assert!(err.is_integrity_violation());
        assert_eq!(
            err.to_string(),
            "Workload error: integrity violation: total balance 9900, expected 10000"
        );
    }
}
