//! Frequency ("addiction curve") query result.

use super::units::{Granularity, OuterUnit};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Result of a frequency query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequencyResult {
    pub event: Option<String>,
    pub from: String,
    pub to: String,
    pub outer_unit: OuterUnit,
    pub granularity: Granularity,
    /// bucket-start → array where index N is the count of users who
    /// performed the event in at least N+1 sub-periods of `granularity`.
    /// Non-increasing by construction.
    pub data: IndexMap<String, Vec<i64>>,
}
