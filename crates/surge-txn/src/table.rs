//! Server-side transaction table: TxnId -> ordered operation log.
//!
//! The log serves two masters: commit replays its PUTs into the store, and
//! both commit and abort derive the set of keys to unlock from it.

use std::collections::HashMap;

use surge_common::TxnId;

/// One recorded client operation, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get { key: String },
    Put { key: String, value: String },
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Operation::Get { key } => key,
            Operation::Put { key, .. } => key,
        }
    }
}

/// Map of active transactions on this server.
#[derive(Debug, Default)]
pub struct TransactionTable {
    entries: HashMap<TxnId, Vec<Operation>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log for `txid` if this server has not seen it yet.
    /// Transactions come into existence implicitly on their first Get or Put.
    pub fn ensure(&mut self, txid: TxnId) {
        self.entries.entry(txid).or_default();
    }

    /// Append an operation to the transaction's log.
    pub fn record(&mut self, txid: TxnId, op: Operation) {
        self.entries.entry(txid).or_default().push(op);
    }

    /// Remove the transaction and hand back its log, if it exists.
    pub fn remove(&mut self, txid: TxnId) -> Option<Vec<Operation>> {
        self.entries.remove(&txid)
    }

    pub fn contains(&self, txid: TxnId) -> bool {
        self.entries.contains_key(&txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
