use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ratelimit::RateLimit;

/// Terminal state of one pagination run. Both are success, not errors;
/// callers use the distinction to decide whether the account is worth
/// rescheduling after its reset window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunOutcome {
    /// The server has no more data for this query.
    Exhausted,
    /// The account's remaining quota fell under the floor; stopped early.
    Halted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Exhausted => "exhausted",
            RunOutcome::Halted => "halted",
        }
    }
}

/// One normalized output record: a matched item with stable identity,
/// canonical URL, extracted text, and the query that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectedRecord {
    pub id: String,
    pub url: String,
    pub text: String,
    pub query: String,
}

/// Outcome of a single page fetch. Ephemeral; only the derived quota
/// timestamp outlives the run.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// Raw response payload as received.
    pub raw: Value,
    /// Normalized records extracted from the matching entries.
    pub records: Vec<CollectedRecord>,
    /// Server-issued continuation token. `None` means the chain is over.
    pub next_cursor: Option<String>,
    /// Rate-limit header values observed on this response.
    pub rate_limit: RateLimit,
}
