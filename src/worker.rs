//! Account worker: drains one batch of accounts to completion.
//!
//! Pagination is strictly sequential per account. Failures stay local: a
//! failed fetch ends that account's run, a failed persistence write is
//! logged and skipped, and the worker moves on either way.

use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::client::FetcherFactory;
use crate::db::{self, Account, Pool};
use crate::model::CollectedRecord;
use crate::paginate::PaginationRun;
use crate::ratelimit::UnknownLimitPolicy;
use crate::sink::ResultSink;

/// Per-run settings shared by every worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub query: String,
    pub page_size: u32,
    pub pacing: Duration,
    pub reset_margin: Duration,
    pub unknown_limits: UnknownLimitPolicy,
}

/// Drain `batch` account by account, accumulate normalized records, and
/// flush them to the sink exactly once. Returns the number of records
/// collected.
pub async fn run_worker(
    worker_id: usize,
    pool: &Pool,
    batch: Vec<Account>,
    proxy: &str,
    cfg: &WorkerConfig,
    factory: &dyn FetcherFactory,
    sink: &dyn ResultSink,
) -> Result<usize> {
    let mut collected: Vec<CollectedRecord> = Vec::new();

    for account in &batch {
        wait_for_reset(worker_id, account, cfg.reset_margin).await;

        let fetcher = match factory.fetcher_for(account, Some(proxy)) {
            Ok(fetcher) => fetcher,
            Err(err) => {
                warn!(worker = worker_id, username = %account.username, error = %err,
                      "failed to build client; skipping account");
                continue;
            }
        };

        let mut run = PaginationRun::new(
            fetcher.as_ref(),
            cfg.query.clone(),
            cfg.page_size,
            cfg.pacing,
            cfg.unknown_limits,
        );

        loop {
            match run.next_page().await {
                Ok(Some(page)) => {
                    collected.extend(page.records);
                    info!(worker = worker_id, username = %account.username,
                          total = collected.len(), "collected records so far");
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(worker = worker_id, username = %account.username, error = %err,
                          "page fetch failed; abandoning account");
                    break;
                }
            }
        }

        // Persist the freshest reset we saw; fall back to the value the
        // account already carried when the terminal page had no headers.
        let reset_at = run.last_reset().unwrap_or(account.quota_reset_at);
        if let Err(err) = db::record_quota(pool, &account.username, reset_at).await {
            warn!(worker = worker_id, username = %account.username, error = %err,
                  "failed to persist quota state");
        }

        if let Some(outcome) = run.outcome() {
            info!(worker = worker_id, username = %account.username,
                  pages = run.pages_fetched(), outcome = outcome.as_str(), "account run finished");
        }
    }

    sink.flush(worker_id, &collected)
        .await
        .with_context(|| format!("worker {worker_id} failed to flush results"))?;
    Ok(collected.len())
}

/// Suspend this worker until the account's remembered quota window has
/// passed, plus a small safety margin.
async fn wait_for_reset(worker_id: usize, account: &Account, margin: Duration) {
    let now = Utc::now().timestamp();
    if account.quota_reset_at <= now {
        return;
    }
    let wait = Duration::from_secs((account.quota_reset_at - now) as u64) + margin;
    info!(worker = worker_id, username = %account.username, wait_secs = wait.as_secs(),
          "account is rate-limited; waiting");
    sleep(wait).await;
}
