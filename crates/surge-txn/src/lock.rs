//! Per-key lock table with strict two-phase locking semantics.
//!
//! Lock modes are implicit in the `KeyLock` shape: any number of readers, or
//! one writer. The only mode change allowed in place is the upgrade of a
//! transaction's own read lock to a write lock, and only while it is the sole
//! reader. Anything else is reported as a conflict for the client to retry;
//! there is no wait queue and no deadlock detection here.

use std::collections::{HashMap, HashSet};

use surge_common::{ConflictReason, TxnId};

/// Lock state for a single key.
#[derive(Debug, Default)]
pub struct KeyLock {
    /// Transactions holding read locks.
    readers: HashSet<TxnId>,
    /// Transaction holding the write lock, if any.
    writer: Option<TxnId>,
}

impl KeyLock {
    fn is_free(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }
}

/// Lock table over the whole key space of one server.
///
/// Callers must hold the service-wide lock; `LockManager` itself does no
/// synchronization.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: HashMap<String, KeyLock>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to take a read lock on `key` for `txid`.
    ///
    /// A transaction that already holds the write lock reads through it
    /// without any table change.
    pub fn acquire_read(&mut self, key: &str, txid: TxnId) -> Result<(), ConflictReason> {
        let lock = self.locks.entry(key.to_string()).or_default();

        match lock.writer {
            Some(writer) if writer != txid => Err(ConflictReason::WriteLocked),
            Some(_) => Ok(()),
            None => {
                lock.readers.insert(txid);
                Ok(())
            }
        }
    }

    /// Attempt to take the write lock on `key` for `txid`.
    ///
    /// If `txid` is the sole reader, its read lock is upgraded in place; no
    /// other transaction ever observes the key unlocked in between. An
    /// upgrade with any other reader present fails conservatively: letting
    /// two readers both wait to upgrade is a deadlock, so the second one is
    /// refused instead.
    pub fn acquire_write(&mut self, key: &str, txid: TxnId) -> Result<(), ConflictReason> {
        let lock = self.locks.entry(key.to_string()).or_default();

        if lock.writer == Some(txid) {
            return Ok(());
        }
        if lock.writer.is_some() {
            return Err(ConflictReason::WriteLocked);
        }
        if lock.readers.len() > 1 {
            return Err(ConflictReason::MultipleReaders);
        }
        if lock.readers.len() == 1 && !lock.readers.contains(&txid) {
            return Err(ConflictReason::ReadLockedByOther);
        }

        lock.writer = Some(txid);
        lock.readers.remove(&txid);
        Ok(())
    }

    /// Release every lock `txid` holds on the given keys.
    ///
    /// The caller supplies the keys from the transaction's operation log.
    /// A key lock left with no readers and no writer is pruned so the table
    /// does not grow with the key space.
    pub fn release<'a>(&mut self, txid: TxnId, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            if let Some(lock) = self.locks.get_mut(key) {
                lock.readers.remove(&txid);
                if lock.writer == Some(txid) {
                    lock.writer = None;
                }
                if lock.is_free() {
                    self.locks.remove(key);
                }
            }
        }
    }

    /// Number of keys with live lock state.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Current holders of `key`: (readers, writer). Test observability.
    pub fn holders(&self, key: &str) -> Option<(Vec<TxnId>, Option<TxnId>)> {
        self.locks.get(key).map(|lock| {
            let mut readers: Vec<TxnId> = lock.readers.iter().copied().collect();
            readers.sort();
            (readers, lock.writer)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: TxnId = TxnId(1);
    const T2: TxnId = TxnId(2);
    const T3: TxnId = TxnId(3);

    #[test]
    fn test_shared_readers_coexist() {
        let mut lm = LockManager::new();
        assert!(lm.acquire_read("k", T1).is_ok());
        assert!(lm.acquire_read("k", T2).is_ok());

        let (readers, writer) = lm.holders("k").unwrap();
        assert_eq!(readers, vec![T1, T2]);
        assert_eq!(writer, None);
    }

    #[test]
    fn test_writer_excludes_readers_and_writers() {
        let mut lm = LockManager::new();
        assert!(lm.acquire_write("k", T1).is_ok());

        assert_eq!(lm.acquire_read("k", T2), Err(ConflictReason::WriteLocked));
        assert_eq!(lm.acquire_write("k", T2), Err(ConflictReason::WriteLocked));
    }

    #[test]
    fn test_writer_reads_through_its_own_lock() {
        let mut lm = LockManager::new();
        assert!(lm.acquire_write("k", T1).is_ok());
        assert!(lm.acquire_read("k", T1).is_ok());

        // The read must not have demoted anything or added a reader entry.
        let (readers, writer) = lm.holders("k").unwrap();
        assert!(readers.is_empty());
        assert_eq!(writer, Some(T1));
    }

    #[test]
    fn test_upgrade_sole_reader() {
        let mut lm = LockManager::new();
        assert!(lm.acquire_read("k", T1).is_ok());
        assert!(lm.acquire_write("k", T1).is_ok());

        let (readers, writer) = lm.holders("k").unwrap();
        assert!(readers.is_empty(), "upgrade must remove the reader entry");
        assert_eq!(writer, Some(T1));
    }

    #[test]
    fn test_upgrade_refused_with_other_readers() {
        let mut lm = LockManager::new();
        assert!(lm.acquire_read("k", T1).is_ok());
        assert!(lm.acquire_read("k", T2).is_ok());

        assert_eq!(lm.acquire_write("k", T1), Err(ConflictReason::MultipleReaders));

        // Sole reader is somebody else entirely.
        let mut lm = LockManager::new();
        assert!(lm.acquire_read("k", T2).is_ok());
        assert_eq!(
            lm.acquire_write("k", T1),
            Err(ConflictReason::ReadLockedByOther)
        );
    }

    #[test]
    fn test_write_reacquire_is_idempotent() {
        let mut lm = LockManager::new();
        assert!(lm.acquire_write("k", T1).is_ok());
        assert!(lm.acquire_write("k", T1).is_ok());
        assert_eq!(lm.holders("k").unwrap().1, Some(T1));
    }

    #[test]
    fn test_release_frees_and_prunes() {
        let mut lm = LockManager::new();
        lm.acquire_read("a", T1).unwrap();
        lm.acquire_write("b", T1).unwrap();
        lm.acquire_read("a", T2).unwrap();

        lm.release(T1, ["a", "b"]);

        // "b" had only T1 and must be pruned; "a" still has T2.
        assert!(lm.holders("b").is_none());
        let (readers, writer) = lm.holders("a").unwrap();
        assert_eq!(readers, vec![T2]);
        assert_eq!(writer, None);
        assert_eq!(lm.len(), 1);

        // Freed key is acquirable by anyone.
        assert!(lm.acquire_write("b", T3).is_ok());
    }

    #[test]
    fn test_release_unknown_key_is_noop() {
        let mut lm = LockManager::new();
        lm.release(T1, ["ghost"]);
        assert!(lm.is_empty());
    }
}
