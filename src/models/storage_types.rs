//! Types describing the local store's own bookkeeping.

use super::units::TableKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of the `_metadata` system table: one entry per caller-named
/// table in the local store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetadata {
    pub name: String,
    pub kind: TableKind,
    pub row_count: u64,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    /// Covered date range, events tables only.
    pub date_range: Option<(chrono::NaiveDate, chrono::NaiveDate)>,
}

/// A single named column and its declared SQL type, as reported by
/// [`StorageEngine::schema`](crate::storage::StorageEngine::schema).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

/// Summary statistics for one column, as reported by
/// [`StorageEngine::summarize`](crate::storage::StorageEngine::summarize)
/// or [`StorageEngine::column_stats`](crate::storage::StorageEngine::column_stats).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnStats {
    pub column: String,
    pub non_null_count: u64,
    pub null_count: u64,
    pub distinct_count: Option<u64>,
    pub min: Option<String>,
    pub max: Option<String>,
}
