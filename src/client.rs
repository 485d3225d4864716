//! Outbound client construction and the page-fetch seam.
//!
//! Each worker builds one client per account, bound to the account's
//! credential and the worker's egress proxy. The `PageFetcher` trait is the
//! boundary the pagination engine sees; tests substitute scripted fakes.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{redirect, Client, Proxy, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::db::Account;
use crate::error::HarvestError;
use crate::ratelimit::RateLimit;

const API_BASE: &str = "https://twitter.com/i/api/graphql/";
const SEARCH_QUERY_ID: &str = "nK1dw4oV3k4w5TdtcAdSww";
const SEARCH_OP: &str = "SearchTimeline";

/// Public web-app bearer; not an account credential.
const BEARER: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs=1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36";

/// Fixed transport retry budget. Retry policy lives here, at the network
/// boundary, never in the pagination engine.
const TRANSPORT_RETRIES: u32 = 2;

/// One fetch's raw outcome: decoded body plus the quota headers.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: Value,
    pub rate_limit: RateLimit,
}

/// The one logical operation the core calls on the network collaborator.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page of results for `query`. `cursor` is omitted on the
    /// first call of a run.
    async fn fetch_page(
        &self,
        query: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<FetchedPage, HarvestError>;
}

/// Builds a `PageFetcher` for one account and proxy pairing.
pub trait FetcherFactory: Send + Sync {
    fn fetcher_for(&self, account: &Account, proxy: Option<&str>) -> Result<Box<dyn PageFetcher>>;
}

/// Fresh csrf token, regenerated per client.
pub fn generate_ct0() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn format_cookies(auth_token: &str, ct0: &str) -> String {
    format!("auth_token={auth_token}; ct0={ct0}")
}

fn default_headers(auth_token: &str) -> Result<HeaderMap> {
    let ct0 = generate_ct0();
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {BEARER}")).context("bearer header")?,
    );
    headers.insert("referer", HeaderValue::from_static("https://twitter.com/"));
    headers.insert("x-twitter-auth-type", HeaderValue::from_static("OAuth2Session"));
    headers.insert("x-twitter-active-user", HeaderValue::from_static("yes"));
    headers.insert("x-twitter-client-language", HeaderValue::from_static("en"));
    headers.insert(
        "x-csrf-token",
        HeaderValue::from_str(&ct0).context("csrf header")?,
    );
    headers.insert(
        "cookie",
        HeaderValue::from_str(&format_cookies(auth_token, &ct0)).context("cookie header")?,
    );
    Ok(headers)
}

/// Build an HTTP client bound to one account credential and an optional
/// egress proxy. Redirects are followed; auth material rides on every
/// request via default headers.
pub fn make_client(auth_token: &str, proxy: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder()
        .default_headers(default_headers(auth_token)?)
        .user_agent(USER_AGENT)
        .redirect(redirect::Policy::limited(10));
    if let Some(addr) = proxy {
        builder = builder.proxy(Proxy::all(addr).with_context(|| format!("invalid proxy {addr}"))?);
    }
    builder.build().context("failed to build http client")
}

/// Real `PageFetcher` over the GraphQL search endpoint.
#[derive(Clone)]
pub struct SearchClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SearchClient {
    pub fn new(auth_token: &str, proxy: Option<&str>) -> Result<Self> {
        let base_url = Url::parse(API_BASE).expect("valid default API URL");
        Ok(Self::with_base_url(make_client(auth_token, proxy)?, base_url))
    }

    pub fn with_base_url(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn search_url(&self) -> Result<Url> {
        self.base_url
            .join(&format!("{SEARCH_QUERY_ID}/{SEARCH_OP}"))
            .context("invalid search URL")
    }
}

#[async_trait]
impl PageFetcher for SearchClient {
    async fn fetch_page(
        &self,
        query: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<FetchedPage, HarvestError> {
        let url = self.search_url().map_err(HarvestError::FetchFailed)?;
        let params = build_search_params(query, cursor, count);

        let mut attempt = 0;
        let res = loop {
            match self.http.get(url.clone()).query(&params).send().await {
                Ok(res) => break res,
                Err(err) if attempt < TRANSPORT_RETRIES && (err.is_connect() || err.is_timeout()) => {
                    attempt += 1;
                    warn!(attempt, error = %err, "transport error; retrying");
                }
                Err(err) => return Err(HarvestError::fetch_failed(err)),
            }
        };

        let rate_limit = RateLimit::from_headers(res.headers());
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(HarvestError::FetchFailed(anyhow!(
                "search error {status}: {body}"
            )));
        }

        let body = res.json::<Value>().await.map_err(HarvestError::fetch_failed)?;
        Ok(FetchedPage { body, rate_limit })
    }
}

/// Default factory: one `SearchClient` per (account, proxy) pairing.
pub struct SearchClientFactory;

impl FetcherFactory for SearchClientFactory {
    fn fetcher_for(&self, account: &Account, proxy: Option<&str>) -> Result<Box<dyn PageFetcher>> {
        let client = SearchClient::new(&account.auth_token, proxy)
            .with_context(|| format!("failed to build client for {}", account.username))?;
        Ok(Box::new(client))
    }
}

/// Encode the GraphQL query parameters. Nested objects travel as compact
/// JSON strings.
pub fn build_search_params(query: &str, cursor: Option<&str>, count: u32) -> Vec<(&'static str, String)> {
    let mut variables = json!({
        "rawQuery": query,
        "count": count,
        "product": "Latest",
        "querySource": "typed_query",
    });
    if let Some(cursor) = cursor {
        variables["cursor"] = json!(cursor);
    }

    vec![
        ("variables", variables.to_string()),
        ("features", gql_features().to_string()),
        (
            "fieldToggles",
            json!({ "withArticleRichContentState": false }).to_string(),
        ),
    ]
}

fn gql_features() -> Value {
    json!({
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "view_counts_everywhere_api_enabled": true,
        "verified_phone_label_enabled": false,
        "responsive_web_enhance_cards_enabled": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ct0_is_hex_token() {
        let ct0 = generate_ct0();
        assert_eq!(ct0.len(), 32);
        assert!(ct0.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(ct0, generate_ct0());
    }

    #[test]
    fn cookies_carry_auth_and_csrf() {
        assert_eq!(
            format_cookies("tok", "abc123"),
            "auth_token=tok; ct0=abc123"
        );
    }

    #[test]
    fn default_headers_keep_csrf_and_cookie_in_sync() {
        let headers = default_headers("tok").unwrap();
        let ct0 = headers.get("x-csrf-token").unwrap().to_str().unwrap();
        let cookie = headers.get("cookie").unwrap().to_str().unwrap();
        assert_eq!(cookie, format_cookies("tok", ct0));
        assert!(headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("Bearer "));
        assert_eq!(
            headers.get("x-twitter-auth-type").unwrap(),
            "OAuth2Session"
        );
    }

    #[test]
    fn search_params_omit_cursor_on_first_call() {
        let params = build_search_params("elon musk", None, 20);
        let variables: Value =
            serde_json::from_str(&params.iter().find(|(k, _)| *k == "variables").unwrap().1)
                .unwrap();
        assert_eq!(variables["rawQuery"], "elon musk");
        assert_eq!(variables["count"], 20);
        assert_eq!(variables["product"], "Latest");
        assert!(variables.get("cursor").is_none());
    }

    #[test]
    fn search_params_carry_cursor_when_present() {
        let params = build_search_params("q", Some("CURSOR-1"), 20);
        let variables: Value =
            serde_json::from_str(&params.iter().find(|(k, _)| *k == "variables").unwrap().1)
                .unwrap();
        assert_eq!(variables["cursor"], "CURSOR-1");
    }

    #[test]
    fn search_url_targets_graphql_endpoint() {
        let client = SearchClient::new("tok", None).unwrap();
        let url = client.search_url().unwrap();
        assert_eq!(
            url.as_str(),
            format!("{API_BASE}{SEARCH_QUERY_ID}/{SEARCH_OP}")
        );
    }
}
