//! YCSB-style workload generation.
//!
//! Keys are drawn from a Zipfian distribution so a small set of hot keys
//! absorbs most of the traffic; the skew parameter theta controls how hot.
//! The read/write mix follows the standard YCSB letters: A is 50/50,
//! B is 95/5, C is read-only.

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use surge_common::{Error, Result};

/// Number of distinct keys the generator draws from.
pub const KEY_SPACE: u64 = 100_000;

/// Operations per generated transaction.
pub const OPS_PER_TXN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    YcsbA,
    YcsbB,
    YcsbC,
    Transfer,
}

impl WorkloadKind {
    /// Fraction of operations that are reads, for the YCSB mixes.
    pub fn read_fraction(&self) -> Option<f64> {
        match self {
            WorkloadKind::YcsbA => Some(0.5),
            WorkloadKind::YcsbB => Some(0.95),
            WorkloadKind::YcsbC => Some(1.0),
            WorkloadKind::Transfer => None,
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "YCSB-A" => Ok(WorkloadKind::YcsbA),
            "YCSB-B" => Ok(WorkloadKind::YcsbB),
            "YCSB-C" => Ok(WorkloadKind::YcsbC),
            "xfer" => Ok(WorkloadKind::Transfer),
            other => Err(Error::Config(format!(
                "unknown workload {other:?} (expected YCSB-A, YCSB-B, YCSB-C, or xfer)"
            ))),
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkloadKind::YcsbA => "YCSB-A",
            WorkloadKind::YcsbB => "YCSB-B",
            WorkloadKind::YcsbC => "YCSB-C",
            WorkloadKind::Transfer => "xfer",
        };
        f.write_str(name)
    }
}

/// One generated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadOp {
    pub key: u64,
    pub is_read: bool,
}

/// Zipfian generator over `[0, items)`.
///
/// The classic YCSB construction (Gray et al.): the zeta normalization
/// constants are precomputed once, then each draw is O(1).
#[derive(Debug, Clone)]
pub struct Zipfian {
    items: u64,
    theta: f64,
    alpha: f64,
    zetan: f64,
    eta: f64,
}

impl Zipfian {
    pub fn new(items: u64, theta: f64) -> Self {
        assert!(items > 0);
        assert!((0.0..1.0).contains(&theta), "theta must be in [0, 1)");

        let zetan = zeta(items, theta);
        let zeta2 = zeta(2, theta);
        let alpha = 1.0 / (1.0 - theta);
        let eta = (1.0 - (2.0 / items as f64).powf(1.0 - theta)) / (1.0 - zeta2 / zetan);

        Self {
            items,
            theta,
            alpha,
            zetan,
            eta,
        }
    }

    pub fn next(&self, rng: &mut impl Rng) -> u64 {
        let u: f64 = rng.gen();
        let uz = u * self.zetan;

        if uz < 1.0 {
            return 0;
        }
        if uz < 1.0 + 0.5f64.powf(self.theta) {
            return 1;
        }

        let key = (self.items as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as u64;
        key.min(self.items - 1)
    }
}

fn zeta(n: u64, theta: f64) -> f64 {
    (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum()
}

/// Stream of operations for one client.
pub struct Workload {
    zipfian: Zipfian,
    read_fraction: f64,
    rng: StdRng,
}

impl Workload {
    pub fn new(kind: WorkloadKind, theta: f64) -> Result<Self> {
        let read_fraction = kind.read_fraction().ok_or_else(|| {
            Error::Config(format!("workload {kind} is not an operation-mix workload"))
        })?;

        Ok(Self {
            zipfian: Zipfian::new(KEY_SPACE, theta),
            read_fraction,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn next_op(&mut self) -> WorkloadOp {
        let key = self.zipfian.next(&mut self.rng);
        let is_read = self.rng.gen_bool(self.read_fraction);
        WorkloadOp { key, is_read }
    }
}
