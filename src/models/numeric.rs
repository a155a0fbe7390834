//! Numeric aggregation query results: bucketed counts, sums, and averages
//! over a property expression.

use super::units::NumericUnit;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Result of a segmentation/numeric query: counts bucketed both by a
/// numeric-value bucket label and by time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumericBucketResult {
    pub event: String,
    pub from: String,
    pub to: String,
    pub property_expression: String,
    pub unit: NumericUnit,
    /// Provider-assigned bucket label (e.g. `"0 - 100"`) → bucket-start →
    /// count. Label order follows the Provider's own iteration order.
    pub series: IndexMap<String, IndexMap<String, i64>>,
}

/// Result of a segmentation/sum query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumericSumResult {
    pub event: String,
    pub from: String,
    pub to: String,
    pub property_expression: String,
    pub unit: NumericUnit,
    pub results: IndexMap<String, f64>,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Result of a segmentation/average query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumericAverageResult {
    pub event: String,
    pub from: String,
    pub to: String,
    pub property_expression: String,
    pub unit: NumericUnit,
    pub results: IndexMap<String, f64>,
}
