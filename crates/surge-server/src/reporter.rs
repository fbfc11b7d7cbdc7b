//! Per-second statistics reporter.
//!
//! Prints counter rates from atomic snapshots, so the report never touches
//! the service lock. Output format is a fixed five-line block per interval:
//!
//! ```text
//! get/s 120.00
//! put/s 30.00
//! ops/s 150.00
//! commit/s 48.00
//! abort/s 2.00
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::info;

use surge_txn::KvService;

/// Spawn the reporter task. It runs until cancelled.
pub fn spawn_stats_reporter(
    service: Arc<KvService>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("stats reporter started (interval: {:?})", interval);

        let mut prev = service.stats().snapshot();
        let mut last_print = Instant::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let now = Instant::now();
                    let snap = service.stats().snapshot();
                    let diff = snap.since(&prev);
                    let delta_s = now.duration_since(last_print).as_secs_f64();
                    prev = snap;
                    last_print = now;

                    println!(
                        "get/s {:.2}\nput/s {:.2}\nops/s {:.2}\ncommit/s {:.2}\nabort/s {:.2}\n",
                        diff.gets as f64 / delta_s,
                        diff.puts as f64 / delta_s,
                        diff.ops() as f64 / delta_s,
                        diff.commits as f64 / delta_s,
                        diff.aborts as f64 / delta_s,
                    );
                }
                _ = cancel_token.cancelled() => {
                    info!("stats reporter shutting down");
                    break;
                }
            }
        }
    })
}
