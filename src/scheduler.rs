//! Scheduler: partitions the account table into fixed-size batches and
//! drives the worker fleet.
//!
//! Worker `i` gets the accounts at offsets `[i * batch_size, (i+1) *
//! batch_size)` and proxy `i` from the pool. Accounts beyond `workers x
//! batch_size` are not scheduled in a given round; that is the run's
//! capacity bound.

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::client::FetcherFactory;
use crate::config::ConfigError;
use crate::db::{self, Pool};
use crate::sink::ResultSink;
use crate::worker::{run_worker, WorkerConfig};

/// Shape of one scheduling round.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub workers: usize,
    pub batch_size: usize,
    /// Index-aligned egress proxies, one per worker.
    pub proxies: Vec<String>,
    /// Top up short batches from the backup pool before dispatch.
    pub promote_backups: bool,
}

/// Run one full scheduling round and return per-worker record counts.
///
/// A worker's failure is logged and isolated; it never aborts its siblings.
pub async fn run(
    pool: &Pool,
    plan: &RunPlan,
    cfg: &WorkerConfig,
    factory: Arc<dyn FetcherFactory>,
    sink: Arc<dyn ResultSink>,
) -> Result<Vec<usize>> {
    if plan.proxies.len() < plan.workers {
        return Err(ConfigError::Invalid("proxy pool smaller than worker count").into());
    }

    let mut handles = Vec::with_capacity(plan.workers);
    for worker_id in 0..plan.workers {
        let offset = (worker_id * plan.batch_size) as i64;
        let mut batch = db::list_batch(pool, offset, plan.batch_size as i64).await?;

        if plan.promote_backups {
            while batch.len() < plan.batch_size {
                match db::claim_backup_account(pool).await? {
                    Some(account) => {
                        info!(worker = worker_id, username = %account.username,
                              "promoted backup account into batch");
                        batch.push(account);
                    }
                    None => {
                        warn!(worker = worker_id, "backup pool exhausted; batch stays short");
                        break;
                    }
                }
            }
        }

        info!(worker = worker_id, accounts = batch.len(), "dispatching batch");

        let pool = pool.clone();
        let proxy = plan.proxies[worker_id].clone();
        let cfg = cfg.clone();
        let factory = Arc::clone(&factory);
        let sink = Arc::clone(&sink);
        handles.push(tokio::spawn(async move {
            run_worker(worker_id, &pool, batch, &proxy, &cfg, &*factory, &*sink).await
        }));
    }

    let mut counts = vec![0usize; plan.workers];
    for (worker_id, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(Ok(count)) => counts[worker_id] = count,
            Ok(Err(err)) => error!(worker = worker_id, error = %err, "worker failed"),
            Err(err) => error!(worker = worker_id, error = %err, "worker panicked"),
        }
    }

    info!(total = counts.iter().sum::<usize>(), "all workers finished");
    Ok(counts)
}
