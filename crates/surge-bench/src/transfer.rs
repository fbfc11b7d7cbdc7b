//! Bank-transfer workload: the system's consistency oracle.
//!
//! Ten accounts are seeded with a known balance. Transfers move a fixed
//! amount between two accounts, always touching them in ascending order so
//! two concurrent transfers can never hold each other's first lock; the
//! loser conflicts on its first acquire and backs off. Balance checks read
//! all accounts in one transaction and must always see the seeded total;
//! anything else is a serializability bug in the engine, not a transient
//! condition, and is surfaced as a dedicated error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use surge_client::{Connection, RetryPolicy, Txn};
use surge_common::error::WorkloadError;
use surge_common::prelude::*;

pub const NUM_ACCOUNTS: u64 = 10;
pub const INITIAL_BALANCE: i64 = 1000;
pub const TRANSFER_AMOUNT: i64 = 100;
pub const TOTAL_BALANCE: i64 = NUM_ACCOUNTS as i64 * INITIAL_BALANCE;

/// Key written once the seeding client has finished, gating the others.
pub const INIT_FLAG_KEY: &str = "init_complete";

pub fn account_key(account: u64) -> String {
    format!("account_{account}")
}

/// An unwritten account reads as empty string, which counts as zero.
fn parse_balance(key: &str, raw: &str) -> Result<i64> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse().map_err(|_| {
        WorkloadError::MalformedBalance {
            key: key.to_string(),
            value: raw.to_string(),
        }
        .into()
    })
}

/// Abort `txn` if the session is still active, then hand the error back for
/// the retry policy to classify.
async fn abort_and_bubble<T>(txn: &mut Txn, err: Error) -> Result<T> {
    if txn.is_active() {
        txn.abort().await.ok();
    }
    Err(err)
}

/// Seed every account with the initial balance, one transaction each.
pub async fn init_accounts(servers: &Arc<Vec<Connection>>, client_id: ClientId) -> Result<()> {
    let policy = RetryPolicy::balance_checks();
    for account in 0..NUM_ACCOUNTS {
        let key = account_key(account);
        let mut txn = Txn::new(servers.clone(), client_id);
        policy
            .run(async || {
                txn.begin();
                if let Err(e) = txn.put(&key, &INITIAL_BALANCE.to_string()).await {
                    return abort_and_bubble(&mut txn, e).await;
                }
                txn.commit().await
            })
            .await?;
    }
    Ok(())
}

/// Move the transfer amount from `client_id`'s account to its neighbor.
pub async fn perform_transfer(client_id: u64, servers: &Arc<Vec<Connection>>) -> Result<()> {
    let src = client_id % NUM_ACCOUNTS;
    let dst = (client_id + 1) % NUM_ACCOUNTS;
    transfer_between(src, dst, servers, ClientId(client_id)).await
}

/// Move the transfer amount from `src` to `dst`.
///
/// Both accounts are locked in ascending id order regardless of transfer
/// direction; this is the deadlock-avoidance discipline the server expects
/// of its clients. Two transfers over the same pair can never hold each
/// other's first lock, so one of them conflicts immediately and backs off
/// instead of both waiting forever.
pub async fn transfer_between(
    src: u64,
    dst: u64,
    servers: &Arc<Vec<Connection>>,
    client_id: ClientId,
) -> Result<()> {
    let mut accounts = [src, dst];
    accounts.sort_unstable();

    let policy = RetryPolicy::transfers();
    let mut txn = Txn::new(servers.clone(), client_id);
    policy
        .run(async || {
            txn.begin();

            let mut balances: HashMap<u64, i64> = HashMap::new();
            for &account in &accounts {
                let key = account_key(account);
                match txn.get(&key).await {
                    Ok(raw) => match parse_balance(&key, &raw) {
                        Ok(balance) => {
                            balances.insert(account, balance);
                        }
                        Err(e) => return abort_and_bubble(&mut txn, e).await,
                    },
                    Err(e) => return abort_and_bubble(&mut txn, e).await,
                }
            }

            if balances[&src] < TRANSFER_AMOUNT {
                let err = WorkloadError::InsufficientFunds {
                    account: src,
                    balance: balances[&src],
                };
                return abort_and_bubble(&mut txn, err.into()).await;
            }

            // Update in the same ascending order the locks were taken.
            for &account in &accounts {
                let delta = if account == src {
                    -TRANSFER_AMOUNT
                } else {
                    TRANSFER_AMOUNT
                };
                let new_balance = balances[&account] + delta;
                if let Err(e) = txn
                    .put(&account_key(account), &new_balance.to_string())
                    .await
                {
                    return abort_and_bubble(&mut txn, e).await;
                }
            }

            txn.commit().await
        })
        .await?;

    debug!(src, dst, amount = TRANSFER_AMOUNT, "transfer committed");
    Ok(())
}

/// Read every account in one transaction and verify the invariant total.
pub async fn check_total_balance(
    servers: &Arc<Vec<Connection>>,
    client_id: ClientId,
) -> Result<i64> {
    let policy = RetryPolicy::balance_checks();
    let mut txn = Txn::new(servers.clone(), client_id);
    policy
        .run(async || {
            txn.begin();

            let mut total = 0i64;
            let mut balances = Vec::with_capacity(NUM_ACCOUNTS as usize);
            for account in 0..NUM_ACCOUNTS {
                let key = account_key(account);
                match txn.get(&key).await {
                    Ok(raw) => match parse_balance(&key, &raw) {
                        Ok(balance) => {
                            total += balance;
                            balances.push(balance);
                        }
                        Err(e) => return abort_and_bubble(&mut txn, e).await,
                    },
                    Err(e) => return abort_and_bubble(&mut txn, e).await,
                }
            }

            txn.commit().await?;

            if total != TOTAL_BALANCE {
                error!(
                    total,
                    expected = TOTAL_BALANCE,
                    ?balances,
                    "INTEGRITY VIOLATION: balance total drifted"
                );
                return Err(WorkloadError::IntegrityViolation {
                    expected: TOTAL_BALANCE,
                    actual: total,
                }
                .into());
            }

            debug!(total, ?balances, "balance check passed");
            Ok(total)
        })
        .await
}

/// One transfer client: seeds (client 0 only), waits for the seed flag, then
/// alternates transfers and balance checks until `done`.
///
/// Returns the number of completed operations.
pub async fn run_transfer_client(
    client_id: u64,
    servers: Arc<Vec<Connection>>,
    done: Arc<AtomicBool>,
) -> u64 {
    let id = ClientId(client_id);

    if client_id == 0 {
        match init_accounts(&servers, id).await {
            Ok(()) => info!(client_id, "bank accounts initialized"),
            Err(e) => {
                error!(client_id, "account initialization failed: {e}");
                return 0;
            }
        }

        let policy = RetryPolicy::balance_checks();
        let mut txn = Txn::new(servers.clone(), id);
        let flagged = policy
            .run(async || {
                txn.begin();
                if let Err(e) = txn.put(INIT_FLAG_KEY, "true").await {
                    return abort_and_bubble(&mut txn, e).await;
                }
                txn.commit().await
            })
            .await;
        match flagged {
            Ok(()) => info!(client_id, "signaled initialization complete"),
            Err(e) => {
                error!(client_id, "failed to signal initialization: {e}");
                return 0;
            }
        }
    }

    // Everyone waits for the seed flag before generating load.
    loop {
        let mut txn = Txn::new(servers.clone(), id);
        txn.begin();
        match txn.get(INIT_FLAG_KEY).await {
            Ok(flag) => {
                let committed = txn.commit().await;
                if committed.is_ok() && flag == "true" {
                    debug!(client_id, "initialization detected, starting transfers");
                    break;
                }
            }
            Err(_) => {
                if txn.is_active() {
                    txn.abort().await.ok();
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let mut ops_completed = 0u64;
    let mut round = 0u64;
    while !done.load(Ordering::Relaxed) {
        if round % 5 == 0 {
            match perform_transfer(client_id, &servers).await {
                Ok(()) => ops_completed += 1,
                Err(e) => warn!(client_id, "transfer failed: {e}"),
            }
        }

        match check_total_balance(&servers, id).await {
            Ok(_) => ops_completed += 1,
            Err(e) if e.is_integrity_violation() => {
                error!(client_id, "balance check failed: {e}");
            }
            Err(e) => warn!(client_id, "balance check failed: {e}"),
        }

        round += 1;
        // Pacing, so the log of ten clients stays readable.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!(client_id, ops_completed, "transfer client finished");
    ops_completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key_format() {
        assert_eq!(account_key(0), "account_0");
        assert_eq!(account_key(9), "account_9");
    }

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance("account_0", "1000").unwrap(), 1000);
        assert_eq!(parse_balance("account_0", "").unwrap(), 0);
        assert!(parse_balance("account_0", "12x").is_err());
    }

    #[test]
    fn test_totals_line_up() {
        assert_eq!(TOTAL_BALANCE, 10_000);
        // Every transfer pair is distinct under ten clients.
        for client in 0..NUM_ACCOUNTS {
            assert_ne!(client % NUM_ACCOUNTS, (client + 1) % NUM_ACCOUNTS);
        }
    }
}
