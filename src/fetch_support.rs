//! Helpers shared by [`SequentialFetcher`](crate::sequential_fetcher::SequentialFetcher)
//! and [`ParallelFetcher`](crate::parallel_fetcher::ParallelFetcher).

use crate::errors::{AnalyticsError, Result};
use crate::models::units::TableKind;
use crate::storage::StorageEngine;
use chrono::{Duration, NaiveDate};
use tracing::warn;

/// How a fetch should treat an already-existing target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// Fail with [`AnalyticsError::TableExists`] if the table exists.
    Create,
    /// Append to an existing table; create it if absent.
    Append,
    /// Drop and recreate the table if it exists.
    Replace,
}

/// Ensures `table` exists with the right shape for `kind`, honoring `mode`.
pub fn prepare_table(
    storage: &StorageEngine,
    table: &str,
    kind: TableKind,
    mode: AppendMode,
) -> Result<()> {
    match mode {
        AppendMode::Create => storage.create_table(table, kind, false),
        AppendMode::Replace => storage.create_table(table, kind, true),
        AppendMode::Append => match storage.metadata(table)? {
            Some(_) => Ok(()),
            None => storage.create_table(table, kind, false),
        },
    }
}

/// Returns every calendar day in `[from, to]`, inclusive, in ascending
/// order. Single-day ranges (`from == to`) yield exactly one day.
pub fn date_range_inclusive(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    if from > to {
        return Vec::new();
    }
    let mut days = Vec::with_capacity((to - from).num_days() as usize + 1);
    let mut current = from;
    while current <= to {
        days.push(current);
        current += Duration::days(1);
    }
    days
}

/// Clamps a caller-requested worker count to the Provider's concurrency
/// cap for `kind`, logging when the request is reduced. Non-positive
/// requests fall back to the default of 5.
pub fn normalize_worker_count(requested: Option<i64>, max_allowed: u32) -> u32 {
    const DEFAULT_WORKERS: u32 = 5;

    let workers = match requested {
        Some(n) if n > 0 => n as u32,
        _ => DEFAULT_WORKERS,
    };

    if workers > max_allowed {
        warn!(
            requested = workers,
            max_allowed, "requested worker count exceeds Provider cap, reducing"
        );
        max_allowed
    } else {
        workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn date_range_single_day() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let days = date_range_inclusive(day, day);
        assert_eq!(days, vec![day]);
    }

    #[test]
    fn date_range_multi_day() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(date_range_inclusive(from, to).len(), 5);
    }

    #[test]
    fn date_range_inverted_is_empty() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(date_range_inclusive(from, to).is_empty());
    }

    #[test]
    fn worker_count_clamps_to_cap() {
        assert_eq!(normalize_worker_count(Some(20), 5), 5);
        assert_eq!(normalize_worker_count(Some(3), 10), 3);
    }

    #[test]
    fn worker_count_defaults_on_non_positive() {
        assert_eq!(normalize_worker_count(Some(0), 10), 5);
        assert_eq!(normalize_worker_count(Some(-1), 10), 5);
        assert_eq!(normalize_worker_count(None, 10), 5);
    }
}
