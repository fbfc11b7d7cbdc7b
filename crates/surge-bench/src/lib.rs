//! # Surge Bench
//!
//! Workload drivers for SurgeKV:
//! - A YCSB-style read/write mix over a Zipfian key distribution
//! - A bank-transfer workload that doubles as a consistency oracle

pub mod transfer;
pub mod workload;

pub use workload::{Workload, WorkloadKind, WorkloadOp, Zipfian};
