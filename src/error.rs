//! Failure taxonomy shared across the harvest pipeline.
//!
//! Only two conditions are worth a typed error here. Everything else is
//! either a normal terminal state (`model::RunOutcome`), an empty claim
//! (`Ok(None)`), or a startup problem (`config::ConfigError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The credential store could not be reached or opened. Fatal to the
    /// operation attempted, not to the process; workers log and skip the
    /// affected persistence step.
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Transport or decode failure on a page request. Ends the current
    /// account's pagination run only; never retried at this layer.
    #[error("page fetch failed: {0}")]
    FetchFailed(anyhow::Error),
}

impl HarvestError {
    pub fn fetch_failed(err: impl Into<anyhow::Error>) -> Self {
        HarvestError::FetchFailed(err.into())
    }
}
