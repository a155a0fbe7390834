//! Error types for the analytics client runtime.
//!
//! All fallible operations in this crate return [`Result<T>`], a thin alias
//! over [`AnalyticsError`]. The variants mirror the error taxonomy the
//! Provider's HTTP surface and the embedded store can produce, so callers
//! can match on a single sum type regardless of which layer raised it.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Unified error type for the analytics client runtime.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Invalid or revoked credentials. Never retried; fatal to the calling
    /// operation (and, inside a parallel fetch, fatal to the whole job).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Provider-advertised throttle (HTTP 429) surfaced after retries are
    /// exhausted. Carries the server-advised delay, if one was present on
    /// the final attempt's `Retry-After` header.
    #[error("rate limited (retry after {retry_after:?}s): {message}")]
    RateLimited {
        /// Seconds the Provider asked the caller to wait, if advertised.
        retry_after: Option<u64>,
        /// Server-provided message, if any.
        message: String,
    },

    /// A 4xx error other than authentication or rate-limiting; caller
    /// correctable (invalid event name, malformed expression, unknown
    /// bookmark). Never retried.
    #[error("query error: {0}")]
    Query(String),

    /// A 5xx error surfaced after retries are exhausted.
    #[error("server error (status {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the server body.
        message: String,
    },

    /// Network/IO failure reaching the Provider. Retried; surfaces after
    /// retries are exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// The Provider's response body could not be parsed, or was missing
    /// fields a shaping function required. Not retried; indicates version
    /// drift between this client and the Provider.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A table already exists and `replace` was not requested.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// A table was referenced that does not exist in the local store.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Invalid configuration supplied by the caller (missing credentials,
    /// invalid base URL, conflicting fetch flags, and so on).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The embedded analytical store returned an error unrelated to the
    /// table-existence invariants above (disk I/O, constraint violation,
    /// malformed SQL).
    #[error("storage error: {0}")]
    Storage(String),
}

impl AnalyticsError {
    /// Returns true if a Transport-layer retry loop should attempt this
    /// request again.
    ///
    /// Retryable errors are connection failures, rate limits, and 5xx
    /// server errors. Authentication failures, query errors, protocol
    /// errors, and storage precondition failures are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalyticsError::Transport(_)
                | AnalyticsError::RateLimited { .. }
                | AnalyticsError::Server { .. }
        )
    }

    /// Returns true if this error must abort an entire [`ParallelFetcher`]
    /// job rather than being recorded as a single slice's failure.
    ///
    /// [`ParallelFetcher`]: crate::parallel_fetcher::ParallelFetcher
    pub fn is_fatal_to_job(&self) -> bool {
        matches!(self, AnalyticsError::Authentication(_))
    }

    /// Returns true if this is a caller-correctable 4xx-class error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalyticsError::Query(_) | AnalyticsError::Authentication(_)
        ) || matches!(self, AnalyticsError::Server { status, .. } if (400..500).contains(status))
    }

    /// Returns true if this is a 5xx-class server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AnalyticsError::Server { status, .. } if (500..600).contains(status))
    }
}

impl From<reqwest::Error> for AnalyticsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalyticsError::Transport(format!("request timed out: {err}"))
        } else if let Some(status) = err.status() {
            let message = err.to_string();
            match status.as_u16() {
                401 | 403 => AnalyticsError::Authentication(message),
                429 => AnalyticsError::RateLimited {
                    retry_after: None,
                    message,
                },
                s if (400..500).contains(&s) => AnalyticsError::Query(message),
                s => AnalyticsError::Server { status: s, message },
            }
        } else {
            AnalyticsError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::Protocol(err.to_string())
    }
}

impl From<url::ParseError> for AnalyticsError {
    fn from(err: url::ParseError) -> Self {
        AnalyticsError::Config(format!("invalid URL: {err}"))
    }
}

impl From<duckdb::Error> for AnalyticsError {
    fn from(err: duckdb::Error) -> Self {
        AnalyticsError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(err: std::io::Error) -> Self {
        AnalyticsError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_variants() {
        assert!(AnalyticsError::Transport("x".into()).is_retryable());
        assert!(AnalyticsError::RateLimited {
            retry_after: Some(5),
            message: "x".into()
        }
        .is_retryable());
        assert!(AnalyticsError::Server {
            status: 503,
            message: "x".into()
        }
        .is_retryable());

        assert!(!AnalyticsError::Authentication("x".into()).is_retryable());
        assert!(!AnalyticsError::Query("x".into()).is_retryable());
        assert!(!AnalyticsError::Protocol("x".into()).is_retryable());
        assert!(!AnalyticsError::TableExists("x".into()).is_retryable());
    }

    #[test]
    fn fatal_to_job_is_auth_only() {
        assert!(AnalyticsError::Authentication("x".into()).is_fatal_to_job());
        assert!(!AnalyticsError::Server {
            status: 500,
            message: "x".into()
        }
        .is_fatal_to_job());
        assert!(!AnalyticsError::RateLimited {
            retry_after: None,
            message: "x".into()
        }
        .is_fatal_to_job());
    }

    #[test]
    fn display_never_loses_message() {
        let err = AnalyticsError::Server {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "server error (status 500): boom");
    }
}
