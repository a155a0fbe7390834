//! Segmentation query result.

use super::units::SegmentationUnit;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Result of a segmentation query: event counts bucketed over time,
/// optionally split by a property's values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentationResult {
    pub event: String,
    pub from: String,
    pub to: String,
    pub unit: SegmentationUnit,
    /// The `on` expression used to segment, if one was supplied.
    pub segment_property: Option<String>,
    /// Sum of every count across every segment and bucket.
    pub total: i64,
    /// segment-value (or the event name, when unsegmented) → bucket-start
    /// (ISO date/time) → count. Order follows the Provider's own series.
    pub series: IndexMap<String, IndexMap<String, i64>>,
}
