//! RPC message types.
//!
//! Lock conflicts travel as a structured `ConflictReason` in the response
//! payload rather than as error strings, so client-side retry classification
//! is a match on an enum, not substring matching. Commit and Abort have no
//! failure payload at all: the server always acknowledges them.

use serde::{Deserialize, Serialize};

use surge_common::{ClientId, ConflictReason, TxnId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Get {
        key: String,
        txid: TxnId,
        client_id: ClientId,
    },
    Put {
        key: String,
        value: String,
        txid: TxnId,
        client_id: ClientId,
    },
    Commit {
        txid: TxnId,
        /// Set on exactly one participant so multi-server commits are counted
        /// once in the statistics.
        lead: bool,
    },
    Abort {
        txid: TxnId,
    },
}

impl Request {
    /// Method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Request::Get { .. } => "Get",
            Request::Put { .. } => "Put",
            Request::Commit { .. } => "Commit",
            Request::Abort { .. } => "Abort",
        }
    }
}

/// Successful Get payload.
///
/// `present` lets callers distinguish "key absent" from "key committed with
/// an empty value"; `value` is the empty string in the absent case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReply {
    pub value: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Get(Result<GetReply, ConflictReason>),
    Put(Result<(), ConflictReason>),
    Commit,
    Abort,
}
