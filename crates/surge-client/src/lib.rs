//! # Surge Client
//!
//! Native client for SurgeKV providing:
//! - Transactional sessions with a write-set cache (read-your-own-writes)
//! - Deterministic key sharding across independent servers
//! - Retry with exponential backoff on lock conflicts
//!
//! A transaction may span several servers; every server that handled one of
//! its operations is tracked as a participant and receives the matching
//! commit or abort. There is no cross-server atomic commit: participants are
//! notified one at a time, best effort.

pub mod connection;
pub mod retry;
pub mod session;
pub mod shard;

pub use connection::{dial_hosts, Connection};
pub use retry::RetryPolicy;
pub use session::Txn;
pub use shard::server_index;
