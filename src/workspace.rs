//! [`Workspace`]: the facade that owns one [`Transport`] and one
//! [`StorageEngine`] and exposes every operation a caller needs —
//! live queries (see [`crate::live_queries`]), streaming export, and
//! both fetch pipelines.

use crate::credentials::Credentials;
use crate::errors::{AnalyticsError, Result};
use crate::fetch_support::AppendMode;
use crate::models::units::TableKind;
use crate::models::{
    ColumnInfo, ColumnStats, EventRecord, FetchResult, ParallelFetchResult, ProfileRecord,
    TableMetadata,
};
use crate::parallel_fetcher::{ParallelFetcher, ProgressCallback};
use crate::sequential_fetcher::SequentialFetcher;
use crate::storage::{StorageEngine, StoreLocation};
use crate::streaming::{self, EventRangeQuery};
use crate::transport::{EngageFilters, Transport, TransportConfig};
use chrono::NaiveDate;
use futures::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Request shape shared by `fetch_events`/`fetch_profiles`: whether to run
/// the sharded parallel pipeline or the single-stream sequential one, and
/// (for the parallel path) the worker count and progress callback.
#[derive(Clone, Default)]
pub struct FetchOptions {
    pub parallel: bool,
    pub workers: Option<i64>,
    pub progress: Option<ProgressCallback>,
}

/// Outcome of either fetch pipeline, unified so callers need not match on
/// which path ran.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Sequential(FetchResult),
    Parallel(ParallelFetchResult),
}

impl FetchOutcome {
    pub fn row_count(&self) -> u64 {
        match self {
            FetchOutcome::Sequential(r) => r.row_count,
            FetchOutcome::Parallel(r) => r.total_rows,
        }
    }
}

/// The top-level facade: one `Transport`, one `StorageEngine`, resolved
/// `Credentials`.
///
/// Cheaply `Clone` — callers may share one `Workspace` across tasks;
/// `close` is idempotent and safe to call from any clone.
#[derive(Clone)]
pub struct Workspace {
    transport: Transport,
    storage: StorageEngine,
    closed: Arc<AtomicBool>,
}

impl Workspace {
    /// Starts building a `Workspace`.
    pub fn builder() -> WorkspaceBuilder {
        WorkspaceBuilder::default()
    }

    /// Opens a workspace from explicit credentials and a store location.
    pub fn new(credentials: Credentials, store: StoreLocation) -> Result<Self> {
        Self::with_transport_config(credentials, store, TransportConfig::default())
    }

    /// Opens a workspace from credentials resolved via `MP_USERNAME`,
    /// `MP_SECRET`, `MP_PROJECT_ID`, and (optionally) `MP_REGION`.
    pub fn from_env(store: StoreLocation) -> Result<Self> {
        Self::new(Credentials::from_env()?, store)
    }

    fn with_transport_config(
        credentials: Credentials,
        store: StoreLocation,
        transport_config: TransportConfig,
    ) -> Result<Self> {
        let transport = Transport::new(credentials, transport_config)?;
        let storage = StorageEngine::open(store)?;
        Ok(Self {
            transport,
            storage,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Closes the workspace: drops the storage engine's write handle.
    /// Safe to call more than once (only the first call does anything)
    /// and from any clone of this `Workspace`.
    pub fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.storage.close()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AnalyticsError::Config(
                "workspace is closed".to_string(),
            ));
        }
        Ok(())
    }

    // ---- Streaming export ------------------------------------------

    /// Streams normalized event records for `[from, to]` lazily, without
    /// persisting anything.
    pub fn stream_events(
        &self,
        query: EventRangeQuery,
    ) -> impl Stream<Item = Result<EventRecord>> {
        streaming::stream_events(self.transport.clone(), query)
    }

    /// Streams normalized profile records lazily, without persisting
    /// anything.
    pub fn stream_profiles(
        &self,
        filters: EngageFilters,
    ) -> impl Stream<Item = Result<ProfileRecord>> {
        streaming::stream_profiles(self.transport.clone(), filters)
    }

    // ---- Fetch (sequential or parallel) ------------------------------

    /// Fetches events for `[from, to]` into `table`.
    ///
    /// `mode` governs what happens when `table` already exists. When
    /// `options.parallel` is set, the date-sharded [`ParallelFetcher`]
    /// runs instead of the single-stream [`SequentialFetcher`].
    pub async fn fetch_events(
        &self,
        table: &str,
        from: NaiveDate,
        to: NaiveDate,
        events_filter: Vec<String>,
        where_clause: Option<String>,
        mode: AppendMode,
        options: FetchOptions,
    ) -> Result<FetchOutcome> {
        self.ensure_open()?;

        if options.parallel {
            let fetcher = ParallelFetcher::new(self.transport.clone(), self.storage.clone());
            let result = fetcher
                .fetch_events(
                    table,
                    from,
                    to,
                    events_filter,
                    where_clause,
                    options.workers,
                    mode,
                    options.progress,
                    CancellationToken::new(),
                )
                .await?;
            Ok(FetchOutcome::Parallel(result))
        } else {
            let query = EventRangeQuery {
                from: from.to_string(),
                to: to.to_string(),
                events: events_filter,
                where_clause,
            };
            let stream = Box::pin(streaming::stream_events(self.transport.clone(), query));
            let result = SequentialFetcher::new(self.storage.clone())
                .run_events(table, mode, stream)
                .await?;
            Ok(FetchOutcome::Sequential(result))
        }
    }

    /// Fetches the full profile population into `table`. When
    /// `options.parallel` is set, the page-sharded [`ParallelFetcher`]
    /// runs instead of the plain paged stream.
    pub async fn fetch_profiles(
        &self,
        table: &str,
        filters: EngageFilters,
        mode: AppendMode,
        options: FetchOptions,
    ) -> Result<FetchOutcome> {
        self.ensure_open()?;

        if options.parallel {
            let fetcher = ParallelFetcher::new(self.transport.clone(), self.storage.clone());
            let result = fetcher
                .fetch_profiles(
                    table,
                    filters,
                    options.workers,
                    mode,
                    options.progress,
                    CancellationToken::new(),
                )
                .await?;
            Ok(FetchOutcome::Parallel(result))
        } else {
            let stream = Box::pin(streaming::stream_profiles(self.transport.clone(), filters));
            let result = SequentialFetcher::new(self.storage.clone())
                .run_profiles(table, mode, stream)
                .await?;
            Ok(FetchOutcome::Sequential(result))
        }
    }

    // ---- Storage pass-throughs ---------------------------------------

    pub fn create_table(&self, name: &str, kind: TableKind, replace: bool) -> Result<()> {
        self.storage.create_table(name, kind, replace)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.storage.drop_table(name)
    }

    pub fn drop_all_tables(&self, kind_filter: Option<TableKind>) -> Result<()> {
        self.storage.drop_all(kind_filter)
    }

    pub fn schema(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        self.storage.schema(name)
    }

    pub fn sample(&self, name: &str, n: u32) -> Result<Vec<serde_json::Value>> {
        self.storage.sample(name, n)
    }

    pub fn summarize(&self, name: &str) -> Result<Vec<ColumnStats>> {
        self.storage.summarize(name)
    }

    pub fn sql(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        self.storage.sql(query)
    }

    pub fn sql_scalar(&self, query: &str) -> Result<serde_json::Value> {
        self.storage.sql_scalar(query)
    }

    pub fn json_keys(&self, table: &str, column: &str) -> Result<Vec<String>> {
        self.storage.json_keys(table, column)
    }

    pub fn column_stats(&self, table: &str, column: &str) -> Result<ColumnStats> {
        self.storage.column_stats(table, column)
    }

    pub fn table_metadata(&self, name: &str) -> Result<Option<TableMetadata>> {
        self.storage.metadata(name)
    }
}

/// Builder for [`Workspace`]. Credentials resolution order: an explicit
/// [`Credentials`] passed to `credentials()`, else the `MP_*` environment
/// variables, else `build()` fails with `AnalyticsError::Config`.
#[derive(Default)]
pub struct WorkspaceBuilder {
    credentials: Option<Credentials>,
    store: Option<StoreLocation>,
    transport_config: Option<TransportConfig>,
}

impl WorkspaceBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn store(mut self, store: StoreLocation) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }

    /// Resolves credentials (environment variables take priority over an
    /// explicitly supplied value, per §6's "when all four are present
    /// they override any configured account") and opens the `Workspace`.
    pub fn build(self) -> Result<Workspace> {
        let credentials = match Credentials::from_env() {
            Ok(env_creds) => env_creds,
            Err(_) => self.credentials.ok_or_else(|| {
                AnalyticsError::Config(
                    "no credentials: set MP_USERNAME/MP_SECRET/MP_PROJECT_ID or supply Credentials"
                        .to_string(),
                )
            })?,
        };
        let store = self.store.unwrap_or(StoreLocation::Memory);
        let transport_config = self.transport_config.unwrap_or_default();
        Workspace::with_transport_config(credentials, store, transport_config)
    }
}
