//! # Surge Transaction Engine
//!
//! Server-side transaction machinery for SurgeKV:
//! - Per-key reader/writer locks with in-place read-to-write upgrade
//! - Buffered writes, applied to the store only at commit
//! - Operation logs used for both commit replay and lock release
//!
//! All mutating entry points run under one service-wide mutex, so the lock
//! table, transaction table, and store are always observed in a consistent
//! state. Nothing here blocks waiting for a lock: acquisition either succeeds
//! or fails immediately, and waiting is the client's job.

pub mod lock;
pub mod service;
pub mod store;
pub mod table;

pub use lock::{KeyLock, LockManager};
pub use service::{GetOutcome, KvService};
pub use store::StoreEngine;
pub use table::{Operation, TransactionTable};
