//! Credential resolution and region-aware endpoint selection.

use crate::errors::{AnalyticsError, Result};
use std::env;

/// Data-residency region a Provider account can be pinned to.
///
/// The region determines which base URL API requests are sent to; an
/// account created in the EU or India residency will reject requests
/// sent to the US endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Standard (US-hosted) endpoint.
    Standard,
    /// EU data-residency endpoint.
    Eu,
    /// India data-residency endpoint.
    India,
}

impl Region {
    /// Returns the base URL for Live Query API requests in this region.
    /// Endpoint paths (e.g. `/query/events/names`) are joined onto this.
    pub fn query_base_url(self) -> &'static str {
        match self {
            Region::Standard => "https://mixpanel.com/api",
            Region::Eu => "https://eu.mixpanel.com/api",
            Region::India => "https://in.mixpanel.com/api",
        }
    }

    /// Returns the base URL for bulk-export requests (NDJSON event export)
    /// in this region.
    pub fn export_base_url(self) -> &'static str {
        match self {
            Region::Standard => "https://data.mixpanel.com",
            Region::Eu => "https://data-eu.mixpanel.com",
            Region::India => "https://data-in.mixpanel.com",
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Standard
    }
}

/// Account credentials for the Provider's HTTP APIs.
///
/// `Debug` is hand-rolled to redact `secret`; never log or serialize this
/// struct's secret field.
#[derive(Clone)]
pub struct Credentials {
    /// Service account username, or project token depending on auth mode.
    pub account: String,
    /// Service account secret. Never surfaced in `Debug`/`Display`.
    pub secret: String,
    /// Numeric project identifier the account operates against.
    pub project_id: u64,
    /// Data-residency region for this account.
    pub region: Region,
}

impl Credentials {
    /// Builds credentials directly from caller-supplied values.
    pub fn new(account: impl Into<String>, secret: impl Into<String>, project_id: u64) -> Self {
        Self {
            account: account.into(),
            secret: secret.into(),
            project_id,
            region: Region::Standard,
        }
    }

    /// Sets the data-residency region.
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Resolves credentials from the conventional environment variables:
    /// `MP_USERNAME`, `MP_SECRET`, `MP_PROJECT_ID`, and optionally
    /// `MP_REGION` (`us`, `eu`, or `in`; defaults to `us`).
    pub fn from_env() -> Result<Self> {
        let account = env::var("MP_USERNAME")
            .map_err(|_| AnalyticsError::Config("MP_USERNAME is not set".to_string()))?;
        let secret = env::var("MP_SECRET")
            .map_err(|_| AnalyticsError::Config("MP_SECRET is not set".to_string()))?;
        let project_id = env::var("MP_PROJECT_ID")
            .map_err(|_| AnalyticsError::Config("MP_PROJECT_ID is not set".to_string()))?
            .parse::<u64>()
            .map_err(|e| AnalyticsError::Config(format!("invalid MP_PROJECT_ID: {e}")))?;

        let region = match env::var("MP_REGION") {
            Ok(v) => match v.to_ascii_lowercase().as_str() {
                "us" => Region::Standard,
                "eu" => Region::Eu,
                "in" => Region::India,
                other => {
                    return Err(AnalyticsError::Config(format!(
                        "unrecognized MP_REGION: {other}"
                    )))
                }
            },
            Err(_) => Region::Standard,
        };

        Ok(Self {
            account,
            secret,
            project_id,
            region,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("region", &self.region)
            .finish()
    }
}
