//! Rate-limit accounting over the three quota headers the server attaches
//! to every search response.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// Fraction of the window budget kept as headroom, expressed as a ratio.
/// Concurrent workers can share an underlying per-credential budget and
/// observe it with some latency, so the floor stays conservative.
const FLOOR_NUM: u64 = 3;
const FLOOR_DEN: u64 = 10;

/// Snapshot of the quota headers on one response. Missing or unparseable
/// headers stay `None` rather than defaulting to a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Unix epoch seconds at which the window refreshes.
    pub reset_at: Option<i64>,
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        RateLimit {
            limit: parse_header(headers, LIMIT_HEADER),
            remaining: parse_header(headers, REMAINING_HEADER),
            reset_at: parse_header(headers, RESET_HEADER),
        }
    }
}

fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// What to do when a response carries no usable limit headers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownLimitPolicy {
    /// Fail safe: an unknown budget is treated as spent.
    #[default]
    Halt,
    Continue,
}

impl UnknownLimitPolicy {
    pub fn from_allow(allow_unknown: bool) -> Self {
        if allow_unknown {
            UnknownLimitPolicy::Continue
        } else {
            UnknownLimitPolicy::Halt
        }
    }
}

/// Decide whether a run may keep paginating after observing `rl`.
///
/// Halts once the remaining budget drops under 30% of the window limit.
/// A halt is a soft stop for the current run, not an error.
pub fn should_continue(rl: &RateLimit, policy: UnknownLimitPolicy) -> bool {
    match (rl.limit, rl.remaining) {
        (Some(limit), Some(remaining)) if limit > 0 => {
            remaining * FLOOR_DEN >= limit * FLOOR_NUM
        }
        _ => matches!(policy, UnknownLimitPolicy::Continue),
    }
}
