//! Saved report (bookmark / Insights) query result.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Result of executing a saved report (bookmark).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedReportResult {
    pub bookmark_id: u64,
    pub report_type: String,
    pub computed_at: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub headers: Vec<String>,
    /// label → bucket-start → count.
    pub series: IndexMap<String, IndexMap<String, i64>>,
}
