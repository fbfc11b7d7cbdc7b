//! Core identifier types for SurgeKV

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a transaction.
///
/// Generated client-side from a random 64-bit draw. The value 0 is reserved
/// to mean "no active transaction" and is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl TxnId {
    pub const INVALID: TxnId = TxnId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Unique identifier for a client session. Used for logging only; it plays
/// no part in conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_id_validity() {
        assert!(!TxnId::INVALID.is_valid());
        assert!(TxnId(1).is_valid());
        assert_eq!(TxnId(42).to_string(), "txn:42");
    }
}
