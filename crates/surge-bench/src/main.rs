//! SurgeKV client driver
//!
//! Runs a YCSB-style mix or the bank-transfer workload against a set of
//! SurgeKV servers and reports throughput.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, info, warn};

use surge_bench::transfer::run_transfer_client;
use surge_bench::workload::{Workload, WorkloadKind, OPS_PER_TXN};
use surge_client::{dial_hosts, Connection, Txn};
use surge_common::config::parse_host_list;
use surge_common::{ClientConfig, ClientId, Result};

/// Number of concurrent clients the transfer workload runs.
const TRANSFER_CLIENTS: u64 = 10;

/// SurgeKV workload driver
#[derive(Parser, Debug)]
#[command(name = "surge-bench")]
#[command(version, about, long_about = None)]
struct Args {
    /// Comma-separated list of host:ports to connect to
    #[arg(long, default_value = "localhost:8080")]
    hosts: String,

    /// Zipfian distribution skew parameter
    #[arg(long, default_value_t = 0.99)]
    theta: f64,

    /// Workload type (YCSB-A, YCSB-B, YCSB-C, xfer)
    #[arg(long, default_value = "YCSB-B")]
    workload: String,

    /// Duration in seconds for each client to run
    #[arg(long, default_value_t = 30)]
    secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let kind: WorkloadKind = args.workload.parse()?;
    let config = ClientConfig {
        hosts: parse_host_list(&args.hosts),
        theta: args.theta,
        duration: Duration::from_secs(args.secs),
        ..ClientConfig::default()
    };
    config.validate()?;

    println!(
        "hosts {}\ntheta {:.2}\nworkload {}\nsecs {}",
        config.hosts.join(","),
        config.theta,
        kind,
        args.secs,
    );

    let servers = Arc::new(dial_hosts(&config.hosts, config.connect_timeout).await?);
    let done = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    if kind == WorkloadKind::Transfer {
        let total_ops = run_transfer_fleet(servers, done, config.duration).await;
        let ops_per_sec = total_ops as f64 / start.elapsed().as_secs_f64();
        println!("transfer throughput {ops_per_sec:.2} ops/s");
    } else {
        let total_ops = run_ycsb(servers, kind, config.theta, done, config.duration).await?;
        let ops_per_sec = total_ops as f64 / start.elapsed().as_secs_f64();
        println!("throughput {ops_per_sec:.2} ops/s");
    }

    Ok(())
}

async fn run_ycsb(
    servers: Arc<Vec<Connection>>,
    kind: WorkloadKind,
    theta: f64,
    done: Arc<AtomicBool>,
    duration: Duration,
) -> Result<u64> {
    let workload = Workload::new(kind, theta)?;
    let handle = tokio::spawn(run_ycsb_client(0, servers, workload, done.clone()));

    tokio::time::sleep(duration).await;
    done.store(true, Ordering::Relaxed);

    Ok(handle.await.expect("client task panicked"))
}

async fn run_ycsb_client(
    client_id: u64,
    servers: Arc<Vec<Connection>>,
    mut workload: Workload,
    done: Arc<AtomicBool>,
) -> u64 {
    let value = "x".repeat(128);
    let mut txn = Txn::new(servers, ClientId(client_id));
    let mut ops_completed = 0u64;

    while !done.load(Ordering::Relaxed) {
        // A conflicted transaction gets a bounded number of fresh attempts
        // before the client moves on to new keys.
        let mut attempts = 3;
        while attempts > 0 {
            txn.begin();
            match execute_txn(&mut txn, &mut workload, &value).await {
                Ok(ops) => {
                    if let Err(e) = txn.commit().await {
                        warn!(client_id, "commit failed: {e}");
                    }
                    ops_completed += ops;
                    break;
                }
                Err(e) => {
                    debug!(client_id, "transaction attempt failed: {e}");
                    if txn.is_active() {
                        txn.abort().await.ok();
                    }
                    attempts -= 1;
                }
            }
        }
    }

    info!(client_id, ops_completed, "client finished");
    ops_completed
}

async fn execute_txn(txn: &mut Txn, workload: &mut Workload, value: &str) -> Result<u64> {
    let mut ops_completed = 0u64;
    for _ in 0..OPS_PER_TXN {
        let op = workload.next_op();
        let key = op.key.to_string();
        if op.is_read {
            txn.get(&key).await?;
        } else {
            txn.put(&key, value).await?;
        }
        ops_completed += 1;
    }
    Ok(ops_completed)
}

async fn run_transfer_fleet(
    servers: Arc<Vec<Connection>>,
    done: Arc<AtomicBool>,
    duration: Duration,
) -> u64 {
    let mut handles = Vec::new();
    for client_id in 0..TRANSFER_CLIENTS {
        handles.push(tokio::spawn(run_transfer_client(
            client_id,
            servers.clone(),
            done.clone(),
        )));
    }

    tokio::time::sleep(duration).await;
    done.store(true, Ordering::Relaxed);

    let mut total_ops = 0u64;
    for handle in handles {
        total_ops += handle.await.expect("transfer client panicked");
    }
    total_ops
}
