//! # Analytics Client Runtime
//!
//! A client runtime for a hosted event-analytics service: schema
//! discovery, live analytical queries (segmentation, funnels, retention,
//! frequency, numeric aggregations, activity feeds, saved reports, and a
//! scripting endpoint), and bulk data acquisition (event export, profile
//! export) with optional ingestion into a local embedded analytical store.
//!
//! ## Quick start
//!
//! ```no_run
//! use analytics_client_runtime::{Workspace, StoreLocation};
//! use analytics_client_runtime::models::units::SegmentationUnit;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let workspace = Workspace::builder()
//!     .store(StoreLocation::Memory)
//!     .build()?;
//!
//! let result = workspace
//!     .segmentation("signup", "2026-01-01", "2026-01-07", SegmentationUnit::Day, None, None)
//!     .await?;
//! println!("total signups: {}", result.total);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`credentials`]: account/secret/project/region, redacted on display.
//! - [`transport`]: the shared HTTP client — retry/backoff, rate-limit
//!   classification, NDJSON streaming.
//! - [`result_shaping`]: pure functions mapping Provider envelopes into
//!   the typed result values in [`models`].
//! - [`streaming`]: lazy event/profile export sequences over [`transport`].
//! - [`live_queries`]: one method per Live Query endpoint, as inherent
//!   methods on [`Workspace`].
//! - [`storage`]: the embedded analytical store (DuckDB-backed).
//! - [`sequential_fetcher`] / [`parallel_fetcher`]: the two fetch
//!   pipelines that drive [`streaming`]/[`transport`] into [`storage`].
//! - [`workspace`]: the facade tying all of the above together.
//!
//! ## Errors
//!
//! Every fallible operation returns [`errors::Result<T>`], an alias over
//! [`errors::AnalyticsError`]. `ParallelFetcher` is the one exception:
//! per-slice failures are recorded in the returned
//! [`models::ParallelFetchResult`] rather than raised, so one bad day's
//! fetch never aborts the rest of a date range.

#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]

pub mod credentials;
pub mod errors;
pub mod fetch_support;
pub mod live_queries;
pub mod models;
pub mod parallel_fetcher;
pub mod result_shaping;
pub mod sequential_fetcher;
pub mod storage;
pub mod streaming;
pub mod transport;
pub mod workspace;

pub use credentials::{Credentials, Region};
pub use errors::{AnalyticsError, Result};
pub use fetch_support::AppendMode;
pub use parallel_fetcher::ProgressCallback;
pub use storage::{StorageEngine, StoreLocation};
pub use transport::{Transport, TransportConfig};
pub use workspace::{FetchOptions, FetchOutcome, Workspace, WorkspaceBuilder};

/// Prelude of the types most callers need: the facade, its construction
/// types, and the record/result types callers match on.
pub mod prelude {
    pub use crate::credentials::{Credentials, Region};
    pub use crate::errors::{AnalyticsError, Result};
    pub use crate::fetch_support::AppendMode;
    pub use crate::models::*;
    pub use crate::storage::StoreLocation;
    pub use crate::workspace::{FetchOptions, FetchOutcome, Workspace};
}
