//! Fetch outcome types for the sequential and parallel fetchers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a [`SequentialFetcher`](crate::sequential_fetcher::SequentialFetcher) run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchResult {
    pub table: String,
    pub row_count: u64,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub fetched_at: DateTime<Utc>,
}

/// Progress emitted once per slice by [`ParallelFetcher`](crate::parallel_fetcher::ParallelFetcher).
///
/// **Invariant:** `success` implies `error.is_none()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelFetchProgress {
    /// Calendar day (events) or page index (profiles), stringified.
    pub slice_key: String,
    pub slice_total: usize,
    pub rows: u64,
    pub success: bool,
    pub error: Option<String>,
}

impl ParallelFetchProgress {
    pub(crate) fn success(slice_key: String, slice_total: usize, rows: u64) -> Self {
        Self {
            slice_key,
            slice_total,
            rows,
            success: true,
            error: None,
        }
    }

    pub(crate) fn failure(slice_key: String, slice_total: usize, error: String) -> Self {
        Self {
            slice_key,
            slice_total,
            rows: 0,
            success: false,
            error: Some(error),
        }
    }
}

/// Aggregate outcome of a [`ParallelFetcher`](crate::parallel_fetcher::ParallelFetcher) run.
///
/// **Invariant:** `successful_slices + failed_slices` equals the total
/// number of slices scheduled; `failed_slice_keys.len() == failed_slices`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelFetchResult {
    pub table: String,
    pub total_rows: u64,
    pub successful_slices: usize,
    pub failed_slices: usize,
    /// Unique, insertion-ordered.
    pub failed_slice_keys: Vec<String>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub fetched_at: DateTime<Utc>,
}

impl ParallelFetchResult {
    /// True if any slice failed or was never started (cancellation).
    pub fn has_failures(&self) -> bool {
        self.failed_slices > 0
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_failures_reflects_count() {
        let result = ParallelFetchResult {
            table: "t".into(),
            total_rows: 0,
            successful_slices: 5,
            failed_slices: 0,
            failed_slice_keys: vec![],
            duration: Duration::from_secs(1),
            fetched_at: Utc::now(),
        };
        assert!(!result.has_failures());
    }
}
