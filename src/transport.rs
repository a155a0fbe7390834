//! HTTP transport: one process-wide client per [`Workspace`](crate::workspace::Workspace),
//! regional endpoint selection, retry/backoff, and NDJSON streaming.

use crate::credentials::Credentials;
use crate::errors::{AnalyticsError, Result};
use futures::Stream;
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt as _;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Which base URL a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// The Live Query API (`/query/...`).
    Query,
    /// The bulk event-export endpoint (`data.mixpanel.com/export`).
    Export,
}

/// Advisory concurrency/hourly budget for one class of Provider endpoint.
/// [`Transport`] exposes these for higher layers (notably
/// [`ParallelFetcher`](crate::parallel_fetcher::ParallelFetcher)) to consult;
/// Transport itself never enforces them.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBudget {
    pub max_concurrent: u32,
    pub requests_per_hour: u32,
}

impl RateLimitBudget {
    /// Budget for the paged profile-export endpoint (`/query/engage`).
    pub const QUERY: RateLimitBudget = RateLimitBudget {
        max_concurrent: 5,
        requests_per_hour: 60,
    };

    /// Budget for the bulk event-export endpoint.
    pub const EXPORT: RateLimitBudget = RateLimitBudget {
        max_concurrent: 100,
        requests_per_hour: 60,
    };

    /// 80% of the hourly allowance — the threshold at which callers should
    /// log a budget warning rather than refuse to proceed.
    pub fn warning_threshold(self) -> u32 {
        (self.requests_per_hour as f64 * 0.8) as u32
    }
}

/// Configuration for a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub user_agent: String,
    /// Overrides [`Region::query_base_url`](crate::credentials::Region::query_base_url)
    /// when set. Exists for pointing a `Transport` at a local mock server in
    /// tests; production callers should leave this `None` and let `Region`
    /// select the base URL.
    pub query_base_url: Option<String>,
    /// Overrides [`Region::export_base_url`](crate::credentials::Region::export_base_url)
    /// when set, for the same reason as `query_base_url`.
    pub export_base_url: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            user_agent: concat!("analytics-client-runtime/", env!("CARGO_PKG_VERSION")).to_string(),
            query_base_url: None,
            export_base_url: None,
        }
    }
}

/// The Provider's full `/query/engage` page envelope.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EngageEnvelope {
    pub total: u64,
    pub page_size: u64,
    pub session_id: String,
    pub page: u64,
    pub results: Vec<Value>,
}

/// Filters accepted by `queryEngagePage` beyond paging/session identity.
#[derive(Debug, Clone, Default)]
pub struct EngageFilters {
    pub where_clause: Option<String>,
}

/// One process-wide HTTP client speaking the Provider's HTTP surface.
///
/// Cheaply `Clone`: the inner `reqwest::Client` is itself `Arc`-backed
/// connection-pool state, so a cloned `Transport` shares the same pool.
#[derive(Clone)]
pub struct Transport {
    http: Client,
    credentials: Credentials,
    config: TransportConfig,
}

impl Transport {
    /// Builds a new transport for the given credentials and configuration.
    pub fn new(credentials: Credentials, config: TransportConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AnalyticsError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials,
            config,
        })
    }

    fn base_url(&self, kind: EndpointKind) -> &str {
        match kind {
            EndpointKind::Query => self
                .config
                .query_base_url
                .as_deref()
                .unwrap_or_else(|| self.credentials.region.query_base_url()),
            EndpointKind::Export => self
                .config
                .export_base_url
                .as_deref()
                .unwrap_or_else(|| self.credentials.region.export_base_url()),
        }
    }

    fn build_url(&self, kind: EndpointKind, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let base = Url::parse(self.base_url(kind))?;
        let joined = format!("{}{}", base.as_str().trim_end_matches('/'), path);
        let mut url = Url::parse(&joined)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Issues one request and returns the parsed JSON body, applying the
    /// retry/backoff policy described in `send_with_retry`'s doc. `body`,
    /// when present, is sent as a JSON request body (used by the `/query/jql`
    /// scripting endpoint); every other endpoint this crate calls passes
    /// `None` and relies on `params` alone.
    pub async fn request(
        &self,
        method: Method,
        kind: EndpointKind,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.build_url(kind, path, params)?;
        let response = self.send_with_retry(method, url, body).await?;
        let body: Value = response.json().await?;
        Ok(body)
    }

    /// Opens the `queryEngagePage` endpoint used by the parallel profile
    /// fetcher: fetches one page of the paged profile-export envelope.
    pub async fn query_engage_page(
        &self,
        page: u64,
        session_id: Option<&str>,
        filters: &EngageFilters,
    ) -> Result<EngageEnvelope> {
        let mut params: Vec<(&str, String)> = vec![("page", page.to_string())];
        if let Some(session_id) = session_id {
            params.push(("session_id", session_id.to_string()));
        }
        if let Some(where_clause) = &filters.where_clause {
            params.push(("where", where_clause.clone()));
        }

        let url = self.build_url(EndpointKind::Query, "/query/engage", &params)?;
        let response = self.send_with_retry(Method::POST, url, None).await?;
        let envelope: EngageEnvelope = response.json().await?;
        Ok(envelope)
    }

    /// Streams a newline-delimited JSON endpoint lazily: the response body
    /// is never buffered in full. Each item is one decoded JSON value.
    ///
    /// Defensive against a line containing more than one concatenated JSON
    /// value: each line is fed through `serde_json::Deserializer`'s
    /// iterator form rather than a single `from_str` call.
    pub async fn stream_ndjson(
        &self,
        kind: EndpointKind,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<impl Stream<Item = Result<Value>>> {
        let url = self.build_url(kind, path, params)?;
        let response = self.send_with_retry(Method::GET, url, None).await?;

        let byte_stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let reader = tokio_util::io::StreamReader::new(byte_stream);
        let lines = tokio::io::BufReader::new(reader).lines();
        let lines_stream = LinesStream::new(lines);

        let decoded = lines_stream.flat_map(|line_result| {
            let values: Vec<Result<Value>> = match line_result {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        Vec::new()
                    } else {
                        serde_json::Deserializer::from_str(trimmed)
                            .into_iter::<Value>()
                            .map(|r| r.map_err(AnalyticsError::from))
                            .collect()
                    }
                }
                Err(e) => vec![Err(AnalyticsError::from(e))],
            };
            tokio_stream::iter(values)
        });

        Ok(decoded)
    }

    /// Sends a request, retrying on connection errors, HTTP 429, and HTTP
    /// 5xx up to `max_retries` attempts with exponential backoff (base 1s,
    /// cap 60s, jittered), preferring a `Retry-After` header's value on
    /// 429 responses when present.
    pub async fn send_with_retry(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        let mut backoff = self.config.initial_backoff;

        loop {
            attempt += 1;
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .basic_auth(&self.credentials.account, Some(&self.credentials.secret));
            if let Some(body) = body {
                request = request.json(body);
            }

            let outcome = request.send().await;

            let error = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => self.classify_status(response).await,
                Err(e) => AnalyticsError::from(e),
            };

            if attempt >= self.config.max_retries || !error.is_retryable() {
                warn!(
                    attempt,
                    max_retries = self.config.max_retries,
                    url = %url,
                    "request failed, giving up: {error}"
                );
                return Err(error);
            }

            let wait = match &error {
                AnalyticsError::RateLimited {
                    retry_after: Some(secs),
                    ..
                } => Duration::from_secs(*secs),
                _ => jittered(backoff),
            };

            warn!(
                attempt,
                max_retries = self.config.max_retries,
                url = %url,
                wait_ms = wait.as_millis() as u64,
                "request failed, retrying: {error}"
            );

            tokio::time::sleep(wait).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Converts a non-2xx response into the appropriate `AnalyticsError`,
    /// reading the `Retry-After` header for 429s.
    async fn classify_status(&self, response: reqwest::Response) -> AnalyticsError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AnalyticsError::Authentication(body)
            }
            StatusCode::TOO_MANY_REQUESTS => AnalyticsError::RateLimited {
                retry_after,
                message: body,
            },
            s if s.is_client_error() => AnalyticsError::Query(body),
            s if s.is_server_error() => AnalyticsError::Server {
                status: s.as_u16(),
                message: body,
            },
            s => AnalyticsError::Server {
                status: s.as_u16(),
                message: body,
            },
        }
    }
}

fn jittered(base: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_ms = rng.gen_range(0..=(base.as_millis() as u64 / 2).max(1));
    base + Duration::from_millis(jitter_ms)
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .finish()
    }
}
