//! Cursor-driven pagination over one (account, query) pair.
//!
//! `PaginationRun` walks `Start → Fetching → (Continue | Halted | Exhausted)`
//! as a pull-based sequence: each `next_page` call performs at most one fetch
//! and yields control back to the caller with that page's results. A pacing
//! floor separates successive fetches within a run. Runs are finite and not
//! restartable; a fresh run starts a new cursor chain.

use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::client::PageFetcher;
use crate::error::HarvestError;
use crate::extract;
use crate::model::{PageResult, RunOutcome};
use crate::ratelimit::{should_continue, UnknownLimitPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunState {
    Start,
    Fetching { cursor: String },
    Done(RunOutcome),
    Failed,
}

pub struct PaginationRun<'a> {
    fetcher: &'a dyn PageFetcher,
    query: String,
    page_size: u32,
    pacing: Duration,
    policy: UnknownLimitPolicy,
    state: RunState,
    last_reset: Option<i64>,
    pages: u64,
}

impl<'a> PaginationRun<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        query: impl Into<String>,
        page_size: u32,
        pacing: Duration,
        policy: UnknownLimitPolicy,
    ) -> Self {
        Self {
            fetcher,
            query: query.into(),
            page_size,
            pacing,
            policy,
            state: RunState::Start,
            last_reset: None,
            pages: 0,
        }
    }

    /// Fetch the next page, or `None` once the run has reached a terminal
    /// state. A fetch failure poisons the run: it propagates once and every
    /// later call returns `None`.
    pub async fn next_page(&mut self) -> Result<Option<PageResult>, HarvestError> {
        let cursor = match &self.state {
            RunState::Done(_) | RunState::Failed => return Ok(None),
            RunState::Start => None,
            RunState::Fetching { cursor } => {
                // Pacing floor between successive fetches, independent of
                // rate-limit accounting.
                sleep(self.pacing).await;
                Some(cursor.clone())
            }
        };

        let fetched = match self
            .fetcher
            .fetch_page(&self.query, cursor.as_deref(), self.page_size)
            .await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                self.state = RunState::Failed;
                return Err(err);
            }
        };
        self.pages += 1;

        let records = extract::extract_records(&fetched.body, &self.query);
        let next_cursor = extract::extract_cursor(&fetched.body);
        if let Some(reset) = fetched.rate_limit.reset_at {
            self.last_reset = Some(reset);
        }

        // An empty page means no more data, even if a cursor came back.
        self.state = if records.is_empty() {
            RunState::Done(RunOutcome::Exhausted)
        } else if !should_continue(&fetched.rate_limit, self.policy) {
            // Soft stop; the current page still reaches the caller below.
            RunState::Done(RunOutcome::Halted)
        } else if let Some(cursor) = next_cursor.clone() {
            RunState::Fetching { cursor }
        } else {
            RunState::Done(RunOutcome::Exhausted)
        };

        debug!(
            page = self.pages,
            records = records.len(),
            state = ?self.state,
            "fetched page"
        );

        Ok(Some(PageResult {
            raw: fetched.body,
            records,
            next_cursor,
            rate_limit: fetched.rate_limit,
        }))
    }

    /// Terminal outcome, once the run has ended cleanly.
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self.state {
            RunState::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Latest reset time observed across the run, for persistence.
    pub fn last_reset(&self) -> Option<i64> {
        self.last_reset
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchedPage;
    use crate::ratelimit::RateLimit;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<FetchedPage, HarvestError>>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<FetchedPage, HarvestError>>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(responses)),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(
            &self,
            _query: &str,
            _cursor: Option<&str>,
            _count: u32,
        ) -> Result<FetchedPage, HarvestError> {
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(HarvestError::FetchFailed(anyhow!("script exhausted"))))
        }
    }

    fn page_body(ids: &[&str], cursor: Option<&str>) -> Value {
        let mut entries: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "entryId": format!("tweet-{id}"),
                    "content": { "itemContent": { "tweet_results": { "result": {
                        "rest_id": id,
                        "legacy": { "full_text": format!("text {id}") }
                    }}}}
                })
            })
            .collect();
        if let Some(cursor) = cursor {
            entries.push(json!({
                "entryId": "cursor-bottom-0",
                "content": { "itemContent": { "value": cursor } }
            }));
        }
        json!({ "timeline": { "instructions": [{ "entries": entries }] } })
    }

    fn page(ids: &[&str], cursor: Option<&str>, remaining: u64) -> FetchedPage {
        FetchedPage {
            body: page_body(ids, cursor),
            rate_limit: RateLimit {
                limit: Some(100),
                remaining: Some(remaining),
                reset_at: Some(1721900000),
            },
        }
    }

    fn run(fetcher: &dyn PageFetcher) -> PaginationRun<'_> {
        PaginationRun::new(
            fetcher,
            "q",
            20,
            Duration::from_millis(1),
            UnknownLimitPolicy::Halt,
        )
    }

    #[tokio::test]
    async fn follows_cursor_chain_to_exhaustion() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(&["1", "2"], Some("C1"), 90)),
            Ok(page(&["3"], Some("C2"), 80)),
            Ok(page(&[], Some("C3"), 70)),
        ]);
        let mut run = run(&fetcher);

        let p1 = run.next_page().await.unwrap().unwrap();
        assert_eq!(p1.records.len(), 2);
        let p2 = run.next_page().await.unwrap().unwrap();
        assert_eq!(p2.records.len(), 1);
        let p3 = run.next_page().await.unwrap().unwrap();
        assert!(p3.records.is_empty());

        assert!(run.next_page().await.unwrap().is_none());
        assert_eq!(run.outcome(), Some(RunOutcome::Exhausted));
        assert_eq!(run.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn empty_page_ends_run_despite_cursor() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page(&[], Some("MORE"), 90))]);
        let mut run = run(&fetcher);

        let p = run.next_page().await.unwrap().unwrap();
        assert!(p.records.is_empty());
        assert_eq!(p.next_cursor.as_deref(), Some("MORE"));

        assert!(run.next_page().await.unwrap().is_none());
        assert_eq!(run.outcome(), Some(RunOutcome::Exhausted));
    }

    #[tokio::test]
    async fn halting_page_is_still_delivered() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(&["1"], Some("C1"), 90)),
            Ok(page(&["2", "3"], Some("C2"), 10)),
        ]);
        let mut run = run(&fetcher);

        run.next_page().await.unwrap().unwrap();
        let halting = run.next_page().await.unwrap().unwrap();
        assert_eq!(halting.records.len(), 2);

        assert!(run.next_page().await.unwrap().is_none());
        assert_eq!(run.outcome(), Some(RunOutcome::Halted));
    }

    #[tokio::test]
    async fn missing_cursor_is_exhaustion() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page(&["1"], None, 90))]);
        let mut run = run(&fetcher);

        run.next_page().await.unwrap().unwrap();
        assert!(run.next_page().await.unwrap().is_none());
        assert_eq!(run.outcome(), Some(RunOutcome::Exhausted));
    }

    #[tokio::test]
    async fn unknown_headers_halt_by_default() {
        let no_headers = FetchedPage {
            body: page_body(&["1"], Some("C1")),
            rate_limit: RateLimit::default(),
        };
        let fetcher = ScriptedFetcher::new(vec![Ok(no_headers)]);
        let mut run = run(&fetcher);

        let p = run.next_page().await.unwrap().unwrap();
        assert_eq!(p.records.len(), 1);
        assert!(run.next_page().await.unwrap().is_none());
        assert_eq!(run.outcome(), Some(RunOutcome::Halted));
    }

    #[tokio::test]
    async fn fetch_failure_poisons_the_run() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(&["1"], Some("C1"), 90)),
            Err(HarvestError::FetchFailed(anyhow!("boom"))),
        ]);
        let mut run = run(&fetcher);

        run.next_page().await.unwrap().unwrap();
        assert!(run.next_page().await.is_err());
        // later calls return None instead of refetching
        assert!(run.next_page().await.unwrap().is_none());
        assert_eq!(run.outcome(), None);
    }

    #[tokio::test]
    async fn tracks_latest_reset_for_persistence() {
        let mut second = page(&["2"], Some("C2"), 10);
        second.rate_limit.reset_at = Some(1721999999);
        let fetcher = ScriptedFetcher::new(vec![Ok(page(&["1"], Some("C1"), 90)), Ok(second)]);
        let mut run = run(&fetcher);

        run.next_page().await.unwrap().unwrap();
        run.next_page().await.unwrap().unwrap();
        assert_eq!(run.last_reset(), Some(1721999999));
    }
}
