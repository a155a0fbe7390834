//! Small enumerations shared across result types and query parameters.

use serde::{Deserialize, Serialize};

/// Bucket granularity accepted by segmentation-style endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl SegmentationUnit {
    /// The literal string the Provider expects for this unit.
    pub fn as_provider_str(self) -> &'static str {
        match self {
            SegmentationUnit::Minute => "minute",
            SegmentationUnit::Hour => "hour",
            SegmentationUnit::Day => "day",
            SegmentationUnit::Week => "week",
            SegmentationUnit::Month => "month",
        }
    }
}

/// Outer bucket granularity for frequency ("addiction curve") queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OuterUnit {
    Day,
    Week,
    Month,
}

impl OuterUnit {
    pub fn as_provider_str(self) -> &'static str {
        match self {
            OuterUnit::Day => "day",
            OuterUnit::Week => "week",
            OuterUnit::Month => "month",
        }
    }
}

/// Sub-period granularity for frequency queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn as_provider_str(self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

/// Bucket granularity accepted by numeric-aggregation endpoints
/// (segmentation/numeric, segmentation/sum, segmentation/average).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericUnit {
    Hour,
    Day,
}

impl NumericUnit {
    pub fn as_provider_str(self) -> &'static str {
        match self {
            NumericUnit::Hour => "hour",
            NumericUnit::Day => "day",
        }
    }
}

/// Retention interval granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionInterval {
    Day,
    Week,
    Month,
}

impl RetentionInterval {
    pub fn as_provider_str(self) -> &'static str {
        match self {
            RetentionInterval::Day => "day",
            RetentionInterval::Week => "week",
            RetentionInterval::Month => "month",
        }
    }
}

/// The kind of data a table in the local store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Events,
    Profiles,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Events => "events",
            TableKind::Profiles => "profiles",
        }
    }
}

/// Open, heterogeneous property map carried by event and profile records.
///
/// Provider payloads mix strings, numbers, booleans, lists, and nested
/// objects under caller-defined keys; this crate never imposes a static
/// shape on them.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;
