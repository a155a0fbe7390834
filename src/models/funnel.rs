//! Funnel query result.

use serde::{Deserialize, Serialize};

/// A single step within a computed funnel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelStepReport {
    pub event: String,
    pub step_index: u32,
    pub absolute_count: i64,
    /// Ratio of this step's count to the immediately preceding step's
    /// count (1.0 for the first step). Distinct from
    /// [`FunnelResult::overall_conversion_rate`], which is always measured
    /// against the first step.
    pub conversion_rate_from_previous: f64,
}

/// Result of a funnel computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelResult {
    pub funnel_id: u64,
    pub funnel_name: String,
    pub from: String,
    pub to: String,
    /// `count_last / count_0`; 1.0 for a single-step (zero-width) funnel.
    pub overall_conversion_rate: f64,
    pub steps: Vec<FunnelStepReport>,
}
