//! Sequential, single-stream fetch: consumes a `StreamingExport` sequence
//! and writes it into the local store with batched inserts.

use crate::errors::Result;
use crate::fetch_support::{prepare_table, AppendMode};
use crate::models::units::TableKind;
use crate::models::{EventRecord, FetchResult, ProfileRecord};
use crate::storage::StorageEngine;
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::time::Instant;
use tracing::info;

const DEFAULT_BATCH_SIZE: usize = 1000;

/// Runs a record stream to completion against a single target table.
pub struct SequentialFetcher {
    storage: StorageEngine,
    batch_size: usize,
}

impl SequentialFetcher {
    /// Creates a fetcher writing through `storage` with the default batch
    /// size of 1000 rows.
    pub fn new(storage: StorageEngine) -> Self {
        Self {
            storage,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the batch size used for `append_batch` calls.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Consumes `stream` into `table`, creating/appending/replacing per
    /// `mode`. On any mid-stream failure the rows already committed in
    /// prior batches are preserved and the error is surfaced.
    pub async fn run_events(
        &self,
        table: &str,
        mode: AppendMode,
        mut stream: std::pin::Pin<Box<dyn Stream<Item = Result<EventRecord>> + Send>>,
    ) -> Result<FetchResult> {
        let start = Instant::now();
        prepare_table(&self.storage, table, TableKind::Events, mode)?;

        let mut batch = Vec::with_capacity(self.batch_size);
        let mut total_rows = 0u64;

        while let Some(item) = stream.next().await {
            batch.push(item?);
            if batch.len() >= self.batch_size {
                total_rows += batch.len() as u64;
                self.storage.append_event_batch(table, &batch)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            total_rows += batch.len() as u64;
            self.storage.append_event_batch(table, &batch)?;
        }

        info!(table, total_rows, "sequential event fetch complete");

        Ok(FetchResult {
            table: table.to_string(),
            row_count: total_rows,
            duration: start.elapsed(),
            fetched_at: Utc::now(),
        })
    }

    /// Consumes a profile record stream into `table`.
    pub async fn run_profiles(
        &self,
        table: &str,
        mode: AppendMode,
        mut stream: std::pin::Pin<Box<dyn Stream<Item = Result<ProfileRecord>> + Send>>,
    ) -> Result<FetchResult> {
        let start = Instant::now();
        prepare_table(&self.storage, table, TableKind::Profiles, mode)?;

        let mut batch = Vec::with_capacity(self.batch_size);
        let mut total_rows = 0u64;

        while let Some(item) = stream.next().await {
            batch.push(item?);
            if batch.len() >= self.batch_size {
                total_rows += batch.len() as u64;
                self.storage.append_profile_batch(table, &batch)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            total_rows += batch.len() as u64;
            self.storage.append_profile_batch(table, &batch)?;
        }

        info!(table, total_rows, "sequential profile fetch complete");

        Ok(FetchResult {
            table: table.to_string(),
            row_count: total_rows,
            duration: start.elapsed(),
            fetched_at: Utc::now(),
        })
    }
}
