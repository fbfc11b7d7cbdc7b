//! # Surge Server
//!
//! Glue between the transaction engine and the wire protocol: the request
//! dispatcher and the per-second statistics reporter.

pub mod reporter;
pub mod rpc;

pub use reporter::spawn_stats_reporter;
pub use rpc::RpcSurface;
