//! Data model types shared by every layer of the crate: normalized and raw
//! record shapes, result-shaping output types, and storage bookkeeping
//! types.

pub mod activity;
pub mod events;
pub mod fetch;
pub mod frequency;
pub mod funnel;
pub mod numeric;
pub mod profiles;
pub mod retention;
pub mod saved_report;
pub mod segmentation;
pub mod storage_types;
pub mod units;

pub use activity::{ActivityFeedResult, UserEvent};
pub use events::{EventRecord, RawEventRecord};
pub use fetch::{FetchResult, ParallelFetchProgress, ParallelFetchResult};
pub use frequency::FrequencyResult;
pub use funnel::{FunnelResult, FunnelStepReport};
pub use numeric::{NumericAverageResult, NumericBucketResult, NumericSumResult};
pub use profiles::{ProfileRecord, RawProfileRecord};
pub use retention::{RetentionCohort, RetentionResult};
pub use saved_report::SavedReportResult;
pub use segmentation::SegmentationResult;
pub use storage_types::{ColumnInfo, ColumnStats, TableMetadata};
pub use units::{
    Granularity, NumericUnit, OuterUnit, PropertyMap, RetentionInterval, SegmentationUnit,
    TableKind,
};
