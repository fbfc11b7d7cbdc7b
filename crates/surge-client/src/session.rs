//! Transactional client session.
//!
//! A `Txn` walks Idle -> Active -> Idle: `begin` draws a fresh transaction
//! id, `commit`/`abort` notify every participant server and return to Idle.
//! Uncommitted writes are cached in the session's write set so the
//! transaction reads its own writes without a round trip; the server's Get
//! only ever returns committed state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use surge_common::error::TransactionError;
use surge_common::prelude::*;
use surge_protocol::message::{Request, Response};

use crate::connection::Connection;
use crate::shard::server_index;

pub struct Txn {
    servers: Arc<Vec<Connection>>,
    client_id: ClientId,
    id: Option<TxnId>,
    write_set: HashMap<String, String>,
    /// Indices into `servers` of every server this transaction touched.
    participants: BTreeSet<usize>,
}

impl Txn {
    pub fn new(servers: Arc<Vec<Connection>>, client_id: ClientId) -> Self {
        assert!(!servers.is_empty(), "a transaction needs at least one server");
        Self {
            servers,
            client_id,
            id: None,
            write_set: HashMap::new(),
            participants: BTreeSet::new(),
        }
    }

    /// Start a fresh transaction, discarding any prior session state.
    pub fn begin(&mut self) {
        self.id = Some(fresh_txn_id());
        self.write_set.clear();
        self.participants.clear();
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub fn id(&self) -> Option<TxnId> {
        self.id
    }

    fn active_id(&self) -> Result<TxnId> {
        self.id
            .ok_or_else(|| TransactionError::NoActiveTxn.into())
    }

    /// Read `key`, preferring this transaction's own buffered write.
    ///
    /// A lock conflict is returned as-is for the caller's retry logic; the
    /// server has already released this transaction's locks on that server,
    /// and the caller decides whether to abort the rest. Any other failure
    /// aborts the transaction everywhere before surfacing.
    pub async fn get(&mut self, key: &str) -> Result<String> {
        let txid = self.active_id()?;

        // Existence, not empty-string, comparison: Put("k", "") is a real
        // cached value.
        if let Some(value) = self.write_set.get(key) {
            return Ok(value.clone());
        }

        let server = self.route(key);
        let request = Request::Get {
            key: key.to_string(),
            txid,
            client_id: self.client_id,
        };
        match self.servers[server].call(&request).await {
            Ok(Response::Get(Ok(reply))) => Ok(reply.value),
            Ok(Response::Get(Err(reason))) => {
                debug!(%txid, key, %reason, "get hit a lock conflict");
                Err(TransactionError::LockConflict(reason).into())
            }
            Ok(other) => self.fail_fatal(unexpected(request.method(), &other)).await,
            Err(e) => self.fail_fatal(e.to_string()).await,
        }
    }

    /// Write `key` through the owning server, buffering the value locally.
    ///
    /// The cache is updated only after the server accepts the write, so a
    /// refused Put never pollutes read-your-own-writes.
    pub async fn put(&mut self, key: &str, value: &str) -> Result<()> {
        let txid = self.active_id()?;

        let server = self.route(key);
        let request = Request::Put {
            key: key.to_string(),
            value: value.to_string(),
            txid,
            client_id: self.client_id,
        };
        match self.servers[server].call(&request).await {
            Ok(Response::Put(Ok(()))) => {
                self.write_set.insert(key.to_string(), value.to_string());
                Ok(())
            }
            Ok(Response::Put(Err(reason))) => {
                debug!(%txid, key, %reason, "put hit a lock conflict");
                Err(TransactionError::LockConflict(reason).into())
            }
            Ok(other) => self.fail_fatal(unexpected(request.method(), &other)).await,
            Err(e) => self.fail_fatal(e.to_string()).await,
        }
    }

    /// Commit on every participant. The first participant carries the lead
    /// flag so multi-server commits are counted once.
    ///
    /// Individual commit RPC failures are logged, not surfaced: whatever
    /// servers did receive the commit have already applied it, and there is
    /// no protocol to take that back.
    pub async fn commit(&mut self) -> Result<()> {
        let txid = self.active_id()?;

        let mut lead = true;
        for &server in &self.participants {
            let request = Request::Commit { txid, lead };
            lead = false;
            match self.servers[server].call(&request).await {
                Ok(Response::Commit) => {}
                Ok(other) => warn!(
                    %txid,
                    server = self.servers[server].addr(),
                    "unexpected commit response: {other:?}"
                ),
                Err(e) => warn!(
                    %txid,
                    server = self.servers[server].addr(),
                    "commit RPC failed: {e}"
                ),
            }
        }

        self.reset();
        Ok(())
    }

    /// Abort on every participant and return to Idle.
    pub async fn abort(&mut self) -> Result<()> {
        let txid = self.active_id()?;
        self.abort_participants(txid).await;
        self.reset();
        Ok(())
    }

    fn route(&mut self, key: &str) -> usize {
        let server = server_index(key, self.servers.len());
        self.participants.insert(server);
        server
    }

    async fn abort_participants(&self, txid: TxnId) {
        for &server in &self.participants {
            let request = Request::Abort { txid };
            match self.servers[server].call(&request).await {
                Ok(Response::Abort) => {}
                Ok(other) => warn!(
                    %txid,
                    server = self.servers[server].addr(),
                    "unexpected abort response: {other:?}"
                ),
                Err(e) => warn!(
                    %txid,
                    server = self.servers[server].addr(),
                    "abort RPC failed: {e}"
                ),
            }
        }
    }

    /// Transport-level failure: abort everywhere, drop the session state,
    /// and surface a fatal error.
    async fn fail_fatal<T>(&mut self, detail: String) -> Result<T> {
        if let Some(txid) = self.id {
            self.abort_participants(txid).await;
        }
        self.reset();
        Err(TransactionError::ServerSide(detail).into())
    }

    fn reset(&mut self) {
        self.id = None;
        self.write_set.clear();
        self.participants.clear();
    }
}

fn unexpected(method: &str, response: &Response) -> String {
    format!("unexpected response to {method}: {response:?}")
}

/// Draw a random non-zero transaction id. Collisions across clients are
/// possible in principle; at 64 bits they are not a practical concern for
/// this workload.
fn fresh_txn_id() -> TxnId {
    loop {
        let id = rand::random::<u64>();
        if id != 0 {
            return TxnId(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_txn_id_never_invalid() {
        for _ in 0..1000 {
            assert!(fresh_txn_id().is_valid());
        }
    }
}
