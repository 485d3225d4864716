use super::model::{Account, CredentialLine};
use crate::client;
use crate::error::HarvestError;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

const ACCOUNT_COLUMNS: &str = "username, password, email, email_password, auth_token, \
                               mfa_code_url, cookies, quota_reset_at, active";

pub async fn init_pool(database_url: &str) -> Result<Pool, HarvestError> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and ensure the parent
/// directory exists. In-memory URLs and other schemes pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let expanded = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };

    if let Some(parent) = Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{expanded}?{q}"),
        None => format!("sqlite://{expanded}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Parse one `:`-separated credential line. The sixth field is a recovery
/// code or URL and may itself contain colons, so the split is bounded.
pub fn parse_credential_line(line: &str) -> Option<CredentialLine> {
    let mut fields = line.trim().splitn(6, ':');
    let line = CredentialLine {
        username: fields.next()?.to_string(),
        password: fields.next()?.to_string(),
        email: fields.next()?.to_string(),
        email_password: fields.next()?.to_string(),
        auth_token: fields.next()?.to_string(),
        mfa_code_url: fields.next()?.to_string(),
    };
    if line.username.is_empty() || line.auth_token.is_empty() {
        return None;
    }
    Some(line)
}

/// Bulk-import credentials from a file, one account per line. Rows land with
/// a derived cookie string and `active` per `backup_pool`. Duplicate
/// usernames are skipped, so re-running an import is a no-op. Returns the
/// number of rows actually inserted.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn import_accounts(
    pool: &Pool,
    path: impl AsRef<Path>,
    backup_pool: bool,
) -> Result<u64> {
    let content = tokio::fs::read_to_string(path.as_ref())
        .await
        .with_context(|| format!("failed to read {}", path.as_ref().display()))?;

    let mut inserted = 0u64;
    for (lineno, raw) in content.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let Some(cred) = parse_credential_line(raw) else {
            warn!(lineno = lineno + 1, "skipping malformed credential line");
            continue;
        };
        let cookies = client::format_cookies(&cred.auth_token, &client::generate_ct0());
        let res = sqlx::query(
            "INSERT INTO accounts (username, password, email, email_password, auth_token, mfa_code_url, cookies, active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(username) DO NOTHING",
        )
        .bind(&cred.username)
        .bind(&cred.password)
        .bind(&cred.email)
        .bind(&cred.email_password)
        .bind(&cred.auth_token)
        .bind(&cred.mfa_code_url)
        .bind(&cookies)
        .bind(backup_pool)
        .execute(pool)
        .await?;
        inserted += res.rows_affected();
    }
    Ok(inserted)
}

/// Deterministic slice of the working set (backup rows stay in reserve),
/// ordered by insertion; used to partition work across workers into disjoint
/// batches.
#[instrument(skip_all)]
pub async fn list_batch(pool: &Pool, offset: i64, size: i64) -> Result<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE active = 0 ORDER BY rowid LIMIT ? OFFSET ?"
    ))
    .bind(size)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(accounts)
}

/// Upsert the remembered quota-reset time for one account. The stored value
/// never moves backward: concurrent or stale writers lose to the latest
/// observed reset.
#[instrument(skip_all)]
pub async fn record_quota(pool: &Pool, username: &str, reset_at: i64) -> Result<()> {
    sqlx::query("UPDATE accounts SET quota_reset_at = MAX(quota_reset_at, ?) WHERE username = ?")
        .bind(reset_at)
        .bind(username)
        .execute(pool)
        .await?;
    Ok(())
}

/// Atomically take one account out of the backup pool. The select and the
/// `active` flip happen in a single statement, so no two callers can ever
/// receive the same row. `None` means the pool is empty.
#[instrument(skip_all)]
pub async fn claim_backup_account(pool: &Pool) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "UPDATE accounts SET active = 0 \
         WHERE username = (SELECT username FROM accounts WHERE active = 1 ORDER BY rowid LIMIT 1) \
         RETURNING {ACCOUNT_COLUMNS}"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

#[instrument(skip_all)]
pub async fn count_accounts(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn count_backup_accounts(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE active = 1")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
