use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use tw_harvester::client::SearchClientFactory;
use tw_harvester::config;
use tw_harvester::db;
use tw_harvester::ratelimit::UnknownLimitPolicy;
use tw_harvester::scheduler::{self, RunPlan};
use tw_harvester::sink::JsonFileSink;
use tw_harvester::worker::WorkerConfig;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run one harvest round across the account pool")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured search query
    #[arg(long)]
    query: Option<String>,

    /// Override the configured worker count
    #[arg(long)]
    workers: Option<usize>,

    /// Override the configured per-worker batch size
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(Some(&args.config))?;
    if let Some(query) = args.query {
        cfg.harvest.query = query;
    }
    if let Some(workers) = args.workers {
        cfg.harvest.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        cfg.harvest.batch_size = batch_size;
    }
    config::validate(&cfg)?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/accounts.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let plan = RunPlan {
        workers: cfg.harvest.workers,
        batch_size: cfg.harvest.batch_size,
        proxies: cfg.proxies.clone(),
        promote_backups: cfg.harvest.promote_backups,
    };
    let worker_cfg = WorkerConfig {
        query: cfg.harvest.query.clone(),
        page_size: cfg.harvest.page_size,
        pacing: Duration::from_millis(cfg.app.pacing_ms),
        reset_margin: Duration::from_secs(cfg.app.reset_margin_seconds),
        unknown_limits: UnknownLimitPolicy::from_allow(cfg.harvest.allow_unknown_limits),
    };

    info!(query = %worker_cfg.query, workers = plan.workers, batch_size = plan.batch_size,
          "starting harvest round");

    let counts = scheduler::run(
        &pool,
        &plan,
        &worker_cfg,
        Arc::new(SearchClientFactory),
        Arc::new(JsonFileSink::new(&cfg.app.data_dir)),
    )
    .await?;

    info!(total = counts.iter().sum::<usize>(), "harvest round complete");
    Ok(())
}
