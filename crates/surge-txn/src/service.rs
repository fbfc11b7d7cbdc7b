//! The transactional KV service: one server's Get/Put/Commit/Abort core.
//!
//! Every handler takes the service-wide mutex for its full duration, so the
//! lock table, transaction table, and store mutate atomically with respect to
//! each other. The mutex is never held across I/O; handlers only touch
//! in-memory maps. Operation counters are atomics updated alongside and are
//! readable without the mutex.

use parking_lot::Mutex;

use surge_common::metrics::ServiceStats;
use surge_common::prelude::*;

use crate::lock::LockManager;
use crate::store::StoreEngine;
use crate::table::{Operation, TransactionTable};

/// Successful Get result. `present` distinguishes an absent key from a key
/// committed with an empty value; the wire value is "" either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOutcome {
    pub value: String,
    pub present: bool,
}

#[derive(Debug, Default)]
struct ServiceState {
    locks: LockManager,
    table: TransactionTable,
    store: StoreEngine,
}

impl ServiceState {
    /// Release every lock `txid` holds on this server and forget the
    /// transaction. Keys to unlock come from the operation log.
    fn release_and_drop(&mut self, txid: TxnId) {
        if let Some(ops) = self.table.remove(txid) {
            self.locks.release(txid, ops.iter().map(Operation::key));
        }
    }
}

/// A single server's transactional state plus its counters.
#[derive(Debug, Default)]
pub struct KvService {
    state: Mutex<ServiceState>,
    stats: ServiceStats,
}

impl KvService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// Read `key` under a read lock owned by `txid`.
    ///
    /// First contact from an unknown `txid` creates the transaction. On
    /// conflict the transaction is dead on this server: all its locks are
    /// released, its log dropped, and the abort counter bumped. The caller
    /// sees only the committed value; its own buffered writes live in the
    /// client-side write set.
    pub fn get(&self, key: &str, txid: TxnId) -> std::result::Result<GetOutcome, ConflictReason> {
        let mut state = self.state.lock();
        state.table.ensure(txid);

        if let Err(reason) = state.locks.acquire_read(key, txid) {
            state.release_and_drop(txid);
            self.stats.aborts.inc();
            debug!(%txid, key, %reason, "read lock refused");
            return Err(reason);
        }

        state.table.record(txid, Operation::Get { key: key.to_string() });
        let outcome = match state.store.read(key) {
            Some(value) => GetOutcome {
                value: value.to_string(),
                present: true,
            },
            None => GetOutcome {
                value: String::new(),
                present: false,
            },
        };
        self.stats.gets.inc();
        Ok(outcome)
    }

    /// Buffer a write of `key` under a write lock owned by `txid`.
    ///
    /// The store is not touched; the PUT is recorded in the log and becomes
    /// visible only when the transaction commits.
    pub fn put(&self, key: &str, value: &str, txid: TxnId) -> std::result::Result<(), ConflictReason> {
        let mut state = self.state.lock();
        state.table.ensure(txid);

        if let Err(reason) = state.locks.acquire_write(key, txid) {
            state.release_and_drop(txid);
            self.stats.aborts.inc();
            debug!(%txid, key, %reason, "write lock refused");
            return Err(reason);
        }

        state.table.record(
            txid,
            Operation::Put {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
        self.stats.puts.inc();
        Ok(())
    }

    /// Apply the transaction's buffered PUTs and release its locks.
    ///
    /// `lead` is set by the client on exactly one participant of a
    /// multi-server transaction so the commit counter is not inflated.
    /// Committing an unknown transaction is a no-op.
    pub fn commit(&self, txid: TxnId, lead: bool) {
        let mut state = self.state.lock();
        if let Some(ops) = state.table.remove(txid) {
            state.store.apply(&ops);
            state.locks.release(txid, ops.iter().map(Operation::key));
            if lead {
                self.stats.commits.inc();
            }
            debug!(%txid, ops = ops.len(), lead, "transaction committed");
        }
    }

    /// Discard the transaction's buffered operations and release its locks.
    /// Idempotent; aborting an unknown transaction only bumps the counter.
    pub fn abort(&self, txid: TxnId) {
        let mut state = self.state.lock();
        state.release_and_drop(txid);
        self.stats.aborts.inc();
        debug!(%txid, "transaction aborted");
    }

    /// Number of transactions currently active on this server.
    pub fn active_txns(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Number of keys with live lock state.
    pub fn locked_keys(&self) -> usize {
        self.state.lock().locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: TxnId = TxnId(1);
    const T2: TxnId = TxnId(2);

    fn committed(svc: &KvService, key: &str) -> GetOutcome {
        let reader = TxnId(999);
        let outcome = svc.get(key, reader).expect("probe read conflicted");
        svc.commit(reader, true);
        outcome
    }

    #[test]
    fn test_put_get_round_trip() {
        let svc = KvService::new();

        svc.put("test", "value", T1).unwrap();
        svc.commit(T1, true);

        let outcome = committed(&svc, "test");
        assert_eq!(outcome.value, "value");
        assert!(outcome.present);
    }

    #[test]
    fn test_get_absent_key_is_not_an_error() {
        let svc = KvService::new();
        let outcome = svc.get("missing", T1).unwrap();
        assert_eq!(outcome.value, "");
        assert!(!outcome.present);
    }

    #[test]
    fn test_uncommitted_put_is_invisible_and_conflicts() {
        let svc = KvService::new();
        svc.put("k", "v", T1).unwrap();

        // Another transaction cannot even read the key while T1 writes it.
        assert_eq!(svc.get("k", T2), Err(ConflictReason::WriteLocked));

        // T1 is unaffected and commits; now the value is visible.
        svc.commit(T1, true);
        let outcome = committed(&svc, "k");
        assert_eq!(outcome.value, "v");
    }

    #[test]
    fn test_write_write_conflict_releases_loser() {
        let svc = KvService::new();

        svc.put("k", "a", T1).unwrap();
        assert_eq!(svc.put("k", "b", T2), Err(ConflictReason::WriteLocked));

        // The conflict killed T2 on this server.
        assert_eq!(svc.active_txns(), 1);

        svc.commit(T1, true);
        assert_eq!(committed(&svc, "k").value, "a");
    }

    #[test]
    fn test_read_then_write_conflict() {
        let svc = KvService::new();

        svc.get("k", T1).unwrap();
        assert_eq!(svc.put("k", "x", T2), Err(ConflictReason::ReadLockedByOther));

        // T1 still holds its read lock and can commit cleanly.
        svc.commit(T1, true);
        assert_eq!(svc.active_txns(), 0);
        assert_eq!(svc.locked_keys(), 0);
    }

    #[test]
    fn test_self_upgrade_then_commit() {
        let svc = KvService::new();

        svc.get("k", T1).unwrap();
        svc.put("k", "v", T1).unwrap();
        svc.commit(T1, true);

        assert_eq!(committed(&svc, "k").value, "v");
    }

    #[test]
    fn test_upgrade_refused_with_second_reader() {
        let svc = KvService::new();

        svc.get("k", T1).unwrap();
        svc.get("k", T2).unwrap();

        // T1 cannot upgrade past T2; the conflict aborts T1's state here.
        assert_eq!(svc.put("k", "v", T1), Err(ConflictReason::MultipleReaders));

        // T2's read lock survives, so a third writer still conflicts.
        assert_eq!(svc.put("k", "w", TxnId(3)), Err(ConflictReason::ReadLockedByOther));
    }

    #[test]
    fn test_conflict_releases_all_keys_of_loser() {
        let svc = KvService::new();

        svc.put("a", "1", T1).unwrap();
        svc.put("b", "2", T2).unwrap();

        // T1 loses on "b"; its lock on "a" must be gone too.
        assert_eq!(svc.put("b", "x", T1), Err(ConflictReason::WriteLocked));
        assert!(svc.put("a", "2b", T2).is_ok());

        svc.commit(T2, true);
        assert_eq!(committed(&svc, "a").value, "2b");
        assert_eq!(committed(&svc, "b").value, "2");
    }

    #[test]
    fn test_abort_discards_buffered_writes() {
        let svc = KvService::new();

        svc.put("k", "doomed", T1).unwrap();
        svc.abort(T1);

        let outcome = committed(&svc, "k");
        assert!(!outcome.present);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let svc = KvService::new();

        svc.put("k", "v", T1).unwrap();
        svc.abort(T1);
        svc.abort(T1);

        assert_eq!(svc.active_txns(), 0);
        // The key is free again.
        assert!(svc.put("k", "w", T2).is_ok());
    }

    #[test]
    fn test_commit_then_abort_leaves_committed_state() {
        let svc = KvService::new();

        svc.put("k", "kept", T1).unwrap();
        svc.commit(T1, true);
        svc.abort(T1);

        assert_eq!(committed(&svc, "k").value, "kept");
    }

    #[test]
    fn test_commit_unknown_txn_is_noop() {
        let svc = KvService::new();
        svc.commit(TxnId(12345), true);
        assert_eq!(svc.stats().snapshot().commits, 0);
    }

    #[test]
    fn test_lead_flag_gates_commit_counter() {
        let svc = KvService::new();

        svc.put("a", "1", T1).unwrap();
        svc.commit(T1, false);
        assert_eq!(svc.stats().snapshot().commits, 0);

        svc.put("b", "2", T2).unwrap();
        svc.commit(T2, true);
        assert_eq!(svc.stats().snapshot().commits, 1);
    }

    #[test]
    fn test_counters_track_outcomes() {
        let svc = KvService::new();

        svc.put("k", "v", T1).unwrap();
        svc.get("k", T1).unwrap();
        let _ = svc.put("k", "w", T2); // conflict -> abort
        svc.commit(T1, true);

        let snap = svc.stats().snapshot();
        assert_eq!(snap.puts, 1);
        assert_eq!(snap.gets, 1);
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.aborts, 1);
    }

    #[test]
    fn test_no_state_leaks_after_terminal_calls() {
        let svc = KvService::new();

        svc.get("a", T1).unwrap();
        svc.put("b", "1", T1).unwrap();
        svc.put("c", "2", T2).unwrap();

        svc.commit(T1, true);
        svc.abort(T2);

        assert_eq!(svc.active_txns(), 0);
        assert_eq!(svc.locked_keys(), 0);
    }
}
