//! Date-sharded (events) and page-sharded (profiles) producer/consumer
//! fetch pipeline: a worker pool fans out Provider reads while a single
//! dedicated writer task serializes all storage mutations.
//!
//! A hand-rolled worker pool (rather than
//! `futures::stream::buffer_unordered`) is used deliberately: cancellation
//! must stop *scheduling* new slices while leaving in-flight ones to drain
//! or hard-abort, and the set of slices "not yet started" must be
//! reportable exactly — a prefetching combinator makes both of those
//! fuzzy.

use crate::errors::{AnalyticsError, Result};
use crate::fetch_support::{prepare_table, AppendMode};
use crate::models::units::TableKind;
use crate::models::{EventRecord, ParallelFetchProgress, ParallelFetchResult, ProfileRecord};
use crate::streaming::EventRangeQuery;
use crate::transport::{EngageFilters, RateLimitBudget, Transport};
use crate::storage::StorageEngine;
use chrono::{NaiveDate, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_EVENT_WORKERS_DEFAULT_CAP: u32 = 10;
const MAX_PROFILE_WORKERS: u32 = 5;

/// A progress callback invoked exactly once per slice, in completion
/// order (not shard order).
pub type ProgressCallback = Arc<dyn Fn(ParallelFetchProgress) + Send + Sync>;

enum WriteTask {
    Events {
        slice_key: String,
        rows: Vec<EventRecord>,
    },
    Profiles {
        slice_key: String,
        rows: Vec<ProfileRecord>,
    },
}

/// A slice's terminal state, emitted by the writer once it has either
/// committed the slice's batch or given up on the slice entirely — never
/// by a worker the moment a fetch succeeds, so a caller's progress
/// callback only ever sees `Written` after the row is actually durable.
enum SliceOutcome {
    Written { slice_key: String, row_count: u64 },
    Failed { slice_key: String, error: String },
}

/// Parallel producer/consumer fetcher over [`Transport`] and
/// [`StorageEngine`].
pub struct ParallelFetcher {
    transport: Transport,
    storage: StorageEngine,
}

impl ParallelFetcher {
    pub fn new(transport: Transport, storage: StorageEngine) -> Self {
        Self { transport, storage }
    }

    /// Fetches events for `[from, to]`, date-sharded across `workers`
    /// concurrent Provider reads, writing through a single dedicated
    /// writer task.
    ///
    /// An `AuthenticationFailure` on any slice is fatal to the whole job:
    /// no table is created and the error propagates immediately rather
    /// than being recorded as a per-slice failure.
    pub async fn fetch_events(
        &self,
        table: &str,
        from: NaiveDate,
        to: NaiveDate,
        events_filter: Vec<String>,
        where_clause: Option<String>,
        requested_workers: Option<i64>,
        mode: AppendMode,
        progress: Option<ProgressCallback>,
        cancellation: CancellationToken,
    ) -> Result<ParallelFetchResult> {
        let start = Instant::now();
        let workers = crate::fetch_support::normalize_worker_count(
            requested_workers,
            MAX_EVENT_WORKERS_DEFAULT_CAP,
        );

        let days = crate::fetch_support::date_range_inclusive(from, to);
        warn_if_over_budget(days.len(), RateLimitBudget::EXPORT);

        // Probe-style fast fail: run the first slice before creating the
        // table, so an auth failure on page/day zero never leaves a table
        // behind or schedules the remaining workers.
        if let Some(first_day) = days.first() {
            let probe = match self
                .fetch_event_day(*first_day, &events_filter, &where_clause)
                .await
            {
                Err(e) if e.is_fatal_to_job() => return Err(e),
                other => other,
            };
            prepare_table(&self.storage, table, TableKind::Events, mode)?;

            let pending: VecDeque<NaiveDate> = days[1..].iter().copied().collect();
            return self
                .drain_events(
                    table,
                    first_day.to_string(),
                    probe,
                    pending,
                    events_filter,
                    where_clause,
                    workers,
                    progress,
                    cancellation,
                    start,
                )
                .await;
        }

        prepare_table(&self.storage, table, TableKind::Events, mode)?;
        Ok(ParallelFetchResult {
            table: table.to_string(),
            total_rows: 0,
            successful_slices: 0,
            failed_slices: 0,
            failed_slice_keys: Vec::new(),
            duration: start.elapsed(),
            fetched_at: Utc::now(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn drain_events(
        &self,
        table: &str,
        first_slice_key: String,
        first_result: Result<Vec<EventRecord>>,
        mut pending: VecDeque<NaiveDate>,
        events_filter: Vec<String>,
        where_clause: Option<String>,
        workers: u32,
        progress: Option<ProgressCallback>,
        cancellation: CancellationToken,
        start: Instant,
    ) -> Result<ParallelFetchResult> {
        let total_slices = pending.len() + 1;
        let pending = Arc::new(Mutex::new(pending.clone()));
        let (write_tx, mut write_rx) = mpsc::channel::<WriteTask>(2 * workers as usize);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<SliceOutcome>(total_slices.max(1));

        match first_result {
            Ok(rows) => {
                let _ = write_tx
                    .send(WriteTask::Events {
                        slice_key: first_slice_key,
                        rows,
                    })
                    .await;
            }
            Err(e) => {
                let _ = outcome_tx
                    .send(SliceOutcome::Failed {
                        slice_key: first_slice_key,
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        let mut worker_handles = Vec::new();
        for _ in 0..workers {
            let pending = Arc::clone(&pending);
            let transport = self.transport.clone();
            let write_tx = write_tx.clone();
            let outcome_tx = outcome_tx.clone();
            let cancellation = cancellation.clone();
            let events_filter = events_filter.clone();
            let where_clause = where_clause.clone();

            worker_handles.push(tokio::spawn(async move {
                loop {
                    if cancellation.is_cancelled() {
                        break;
                    }
                    let next_day = {
                        let mut guard = pending.lock().unwrap();
                        guard.pop_front()
                    };
                    let Some(day) = next_day else { break };

                    let query = EventRangeQuery {
                        from: day.to_string(),
                        to: day.to_string(),
                        events: events_filter.clone(),
                        where_clause: where_clause.clone(),
                    };
                    let result = fetch_day_events(&transport, query).await;

                    match result {
                        Ok(rows) => {
                            let _ = write_tx
                                .send(WriteTask::Events {
                                    slice_key: day.to_string(),
                                    rows,
                                })
                                .await;
                        }
                        Err(e) => {
                            let _ = outcome_tx
                                .send(SliceOutcome::Failed {
                                    slice_key: day.to_string(),
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    }
                }
            }));
        }

        drop(write_tx);

        let storage = self.storage.clone();
        let table_owned = table.to_string();
        let writer_outcome_tx = outcome_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(task) = write_rx.recv().await {
                match task {
                    WriteTask::Events { slice_key, rows } => {
                        let row_count = rows.len() as u64;
                        let outcome = match storage.append_event_batch(&table_owned, &rows) {
                            Ok(()) => SliceOutcome::Written { slice_key, row_count },
                            Err(e) => SliceOutcome::Failed {
                                slice_key,
                                error: e.to_string(),
                            },
                        };
                        let _ = writer_outcome_tx.send(outcome).await;
                    }
                    WriteTask::Profiles { slice_key, rows } => {
                        let row_count = rows.len() as u64;
                        let outcome = match storage.append_profile_batch(&table_owned, &rows) {
                            Ok(()) => SliceOutcome::Written { slice_key, row_count },
                            Err(e) => SliceOutcome::Failed {
                                slice_key,
                                error: e.to_string(),
                            },
                        };
                        let _ = writer_outcome_tx.send(outcome).await;
                    }
                }
            }
        });
        drop(outcome_tx);

        let mut successful_slices = 0usize;
        let mut failed_slices = 0usize;
        let mut failed_slice_keys = Vec::new();
        let mut total_rows = 0u64;

        while let Some(outcome) = outcome_rx.recv().await {
            match outcome {
                SliceOutcome::Written { slice_key, row_count } => {
                    successful_slices += 1;
                    total_rows += row_count;
                    emit(&progress, ParallelFetchProgress::success(slice_key, total_slices, row_count));
                }
                SliceOutcome::Failed { slice_key, error } => {
                    failed_slices += 1;
                    failed_slice_keys.push(slice_key.clone());
                    emit(&progress, ParallelFetchProgress::failure(slice_key, total_slices, error));
                }
            }
        }

        for handle in worker_handles {
            let _ = handle.await;
        }
        let _ = writer.await;

        if cancellation.is_cancelled() {
            let remaining: Vec<String> = pending
                .lock()
                .unwrap()
                .iter()
                .map(|d| d.to_string())
                .collect();
            for key in remaining {
                failed_slices += 1;
                failed_slice_keys.push(key);
            }
        }

        info!(table, total_rows, successful_slices, failed_slices, "parallel event fetch complete");

        Ok(ParallelFetchResult {
            table: table.to_string(),
            total_rows,
            successful_slices,
            failed_slices,
            failed_slice_keys,
            duration: start.elapsed(),
            fetched_at: Utc::now(),
        })
    }

    async fn fetch_event_day(
        &self,
        day: NaiveDate,
        events_filter: &[String],
        where_clause: &Option<String>,
    ) -> Result<Vec<EventRecord>> {
        let query = EventRangeQuery {
            from: day.to_string(),
            to: day.to_string(),
            events: events_filter.to_vec(),
            where_clause: where_clause.clone(),
        };
        fetch_day_events(&self.transport, query).await
    }

    /// Fetches profiles, page-sharded, starting with a `page=0` probe to
    /// discover `total`/`page_size`/`session_id`, then scheduling the
    /// remaining pages across `workers` concurrent readers.
    pub async fn fetch_profiles(
        &self,
        table: &str,
        filters: EngageFilters,
        requested_workers: Option<i64>,
        mode: AppendMode,
        progress: Option<ProgressCallback>,
        cancellation: CancellationToken,
    ) -> Result<ParallelFetchResult> {
        let start = Instant::now();
        let workers =
            crate::fetch_support::normalize_worker_count(requested_workers, MAX_PROFILE_WORKERS);

        let first_page = self.transport.query_engage_page(0, None, &filters).await?;

        if first_page.page_size == 0 {
            return Err(AnalyticsError::Protocol(
                "engage page_size was zero".to_string(),
            ));
        }

        prepare_table(&self.storage, table, TableKind::Profiles, mode)?;

        let total_pages = first_page.total.div_ceil(first_page.page_size).max(1);
        let session_id = first_page.session_id.clone();

        warn_if_over_budget(total_pages as usize, RateLimitBudget::QUERY);

        let first_rows = shape_profiles(first_page.results)?;
        let pending: VecDeque<u64> = (1..total_pages).collect();

        self.drain_profiles(
            table,
            "0".to_string(),
            Ok(first_rows),
            pending,
            session_id,
            filters,
            workers,
            progress,
            cancellation,
            start,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn drain_profiles(
        &self,
        table: &str,
        first_slice_key: String,
        first_result: Result<Vec<ProfileRecord>>,
        mut pending: VecDeque<u64>,
        session_id: String,
        filters: EngageFilters,
        workers: u32,
        progress: Option<ProgressCallback>,
        cancellation: CancellationToken,
        start: Instant,
    ) -> Result<ParallelFetchResult> {
        let total_slices = pending.len() + 1;
        let pending = Arc::new(Mutex::new(std::mem::take(&mut pending)));
        let (write_tx, mut write_rx) = mpsc::channel::<WriteTask>(2 * workers as usize);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<SliceOutcome>(total_slices.max(1));

        match first_result {
            Ok(rows) => {
                let _ = write_tx
                    .send(WriteTask::Profiles {
                        slice_key: first_slice_key,
                        rows,
                    })
                    .await;
            }
            Err(e) => {
                let _ = outcome_tx
                    .send(SliceOutcome::Failed {
                        slice_key: first_slice_key,
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        let mut worker_handles = Vec::new();
        for _ in 0..workers {
            let pending = Arc::clone(&pending);
            let transport = self.transport.clone();
            let write_tx = write_tx.clone();
            let outcome_tx = outcome_tx.clone();
            let cancellation = cancellation.clone();
            let session_id = session_id.clone();
            let filters = filters.clone();

            worker_handles.push(tokio::spawn(async move {
                loop {
                    if cancellation.is_cancelled() {
                        break;
                    }
                    let next_page = {
                        let mut guard = pending.lock().unwrap();
                        guard.pop_front()
                    };
                    let Some(page) = next_page else { break };

                    let result = transport
                        .query_engage_page(page, Some(&session_id), &filters)
                        .await
                        .map_err(AnalyticsError::from)
                        .and_then(|envelope| shape_profiles(envelope.results));

                    match result {
                        Ok(rows) => {
                            let _ = write_tx
                                .send(WriteTask::Profiles {
                                    slice_key: page.to_string(),
                                    rows,
                                })
                                .await;
                        }
                        Err(e) => {
                            let _ = outcome_tx
                                .send(SliceOutcome::Failed {
                                    slice_key: page.to_string(),
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    }
                }
            }));
        }

        drop(write_tx);

        let storage = self.storage.clone();
        let table_owned = table.to_string();
        let writer_outcome_tx = outcome_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(task) = write_rx.recv().await {
                match task {
                    WriteTask::Events { slice_key, rows } => {
                        let row_count = rows.len() as u64;
                        let outcome = match storage.append_event_batch(&table_owned, &rows) {
                            Ok(()) => SliceOutcome::Written { slice_key, row_count },
                            Err(e) => SliceOutcome::Failed {
                                slice_key,
                                error: e.to_string(),
                            },
                        };
                        let _ = writer_outcome_tx.send(outcome).await;
                    }
                    WriteTask::Profiles { slice_key, rows } => {
                        let row_count = rows.len() as u64;
                        let outcome = match storage.append_profile_batch(&table_owned, &rows) {
                            Ok(()) => SliceOutcome::Written { slice_key, row_count },
                            Err(e) => SliceOutcome::Failed {
                                slice_key,
                                error: e.to_string(),
                            },
                        };
                        let _ = writer_outcome_tx.send(outcome).await;
                    }
                }
            }
        });
        drop(outcome_tx);

        let mut successful_slices = 0usize;
        let mut failed_slices = 0usize;
        let mut failed_slice_keys = Vec::new();
        let mut total_rows = 0u64;

        while let Some(outcome) = outcome_rx.recv().await {
            match outcome {
                SliceOutcome::Written { slice_key, row_count } => {
                    successful_slices += 1;
                    total_rows += row_count;
                    emit(&progress, ParallelFetchProgress::success(slice_key, total_slices, row_count));
                }
                SliceOutcome::Failed { slice_key, error } => {
                    failed_slices += 1;
                    failed_slice_keys.push(slice_key.clone());
                    emit(&progress, ParallelFetchProgress::failure(slice_key, total_slices, error));
                }
            }
        }

        for handle in worker_handles {
            let _ = handle.await;
        }
        let _ = writer.await;

        if cancellation.is_cancelled() {
            let remaining: Vec<String> = pending
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.to_string())
                .collect();
            for key in remaining {
                failed_slices += 1;
                failed_slice_keys.push(key);
            }
        }

        info!(table, total_rows, successful_slices, failed_slices, "parallel profile fetch complete");

        Ok(ParallelFetchResult {
            table: table.to_string(),
            total_rows,
            successful_slices,
            failed_slices,
            failed_slice_keys,
            duration: start.elapsed(),
            fetched_at: Utc::now(),
        })
    }
}

async fn fetch_day_events(transport: &Transport, query: EventRangeQuery) -> Result<Vec<EventRecord>> {
    use futures::StreamExt;
    let mut stream = Box::pin(crate::streaming::stream_events(transport.clone(), query));
    let mut rows = Vec::new();
    while let Some(item) = stream.next().await {
        rows.push(item?);
    }
    Ok(rows)
}

fn shape_profiles(values: Vec<serde_json::Value>) -> Result<Vec<ProfileRecord>> {
    values
        .into_iter()
        .map(|v| {
            let raw: crate::models::RawProfileRecord = serde_json::from_value(v)?;
            ProfileRecord::from_raw(raw)
        })
        .collect()
}

fn warn_if_over_budget(expected_requests: usize, budget: RateLimitBudget) {
    if expected_requests as u32 > budget.warning_threshold() {
        warn!(
            expected_requests,
            hourly_budget = budget.requests_per_hour,
            "expected request count exceeds 80% of the hourly budget"
        );
    }
}

fn emit(progress: &Option<ProgressCallback>, event: ParallelFetchProgress) {
    if let Some(callback) = progress {
        callback(event);
    }
}
