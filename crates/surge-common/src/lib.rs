//! # Surge Common
//!
//! Common types, errors, and utilities shared across all SurgeKV crates.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::{ClientConfig, ServerConfig};
pub use error::{ConflictReason, Error, ProtocolError, Result, TransactionError, WorkloadError};
pub use types::{ClientId, TxnId};

/// Re-export commonly used external types
pub mod prelude {
    pub use super::error::{ConflictReason, Error, Result};
    pub use super::types::{ClientId, TxnId};
    pub use tracing::{debug, error, info, trace, warn};
}
