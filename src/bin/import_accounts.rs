use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use tw_harvester::config;
use tw_harvester::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Bulk-import a delimited credential list into the account store"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Credential file, one username:password:email:email_password:auth_token:mfa_code_url per line
    #[arg(long)]
    file: PathBuf,

    /// Mark the imported rows as backup-pool accounts held in reserve
    #[arg(long)]
    backup_pool: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/accounts.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let inserted = db::import_accounts(&pool, &args.file, args.backup_pool).await?;
    let total = db::count_accounts(&pool).await?;
    let backups = db::count_backup_accounts(&pool).await?;
    info!(inserted, total, backups, "credential import finished");
    Ok(())
}
