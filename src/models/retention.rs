//! Retention query result.

use super::units::RetentionInterval;
use serde::{Deserialize, Serialize};

/// One cohort's retention curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionCohort {
    pub cohort_date: String,
    pub size: i64,
    /// Retention rate per interval; index 0 is the cohort-defining period
    /// (always 1.0 when `size > 0`). Periods the Provider has not yet
    /// reached are omitted rather than reported as zero.
    pub retention: Vec<f64>,
}

/// Result of a retention query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionResult {
    pub born_event: String,
    pub return_event: Option<String>,
    pub from: String,
    pub to: String,
    pub interval: RetentionInterval,
    pub interval_count: u32,
    pub cohorts: Vec<RetentionCohort>,
}
