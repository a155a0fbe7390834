//! Pure functions that map Provider JSON response envelopes into the
//! uniform, typed result values of [`crate::models`].
//!
//! None of these functions perform I/O; each is total over well-formed
//! envelopes and returns [`AnalyticsError::Protocol`] for malformed ones
//! (missing keys, wrong value kinds).

use crate::errors::{AnalyticsError, Result};
use crate::models::units::{Granularity, NumericUnit, OuterUnit, RetentionInterval, SegmentationUnit};
use crate::models::*;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;

fn protocol(msg: impl Into<String>) -> AnalyticsError {
    AnalyticsError::Protocol(msg.into())
}

fn require_object<'a>(value: &'a Value, what: &str) -> Result<&'a serde_json::Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| protocol(format!("{what}: expected a JSON object")))
}

fn require_field<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'a Value> {
    obj.get(key)
        .ok_or_else(|| protocol(format!("missing required field `{key}`")))
}

fn require_i64(value: &Value, what: &str) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| protocol(format!("{what}: expected an integer")))
}

/// Shapes a `/query/segmentation` envelope:
/// `{legend_size, data: {series: [...], values: {<segment>: {<bucket>: count}}}}`.
pub fn shape_segmentation(
    envelope: &Value,
    event: &str,
    from: &str,
    to: &str,
    unit: SegmentationUnit,
    segment_property: Option<String>,
) -> Result<SegmentationResult> {
    let root = require_object(envelope, "segmentation envelope")?;
    let data = require_object(require_field(root, "data")?, "segmentation.data")?;
    let values = require_object(require_field(data, "values")?, "segmentation.data.values")?;

    let mut series: IndexMap<String, IndexMap<String, i64>> = IndexMap::new();
    let mut total: i64 = 0;

    for (segment_key, buckets_value) in values.iter() {
        let buckets = require_object(buckets_value, "segmentation.data.values.<segment>")?;
        let mut bucket_map = IndexMap::new();
        for (bucket_key, count_value) in buckets.iter() {
            let count = require_i64(count_value, "segmentation count")?;
            total += count;
            bucket_map.insert(bucket_key.clone(), count);
        }
        series.insert(segment_key.clone(), bucket_map);
    }

    Ok(SegmentationResult {
        event: event.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        unit,
        segment_property,
        total,
        series,
    })
}

/// Shapes a `/query/funnels` envelope into a [`FunnelResult`].
///
/// Step *i*'s `conversion_rate_from_previous` is measured against step
/// *i-1* (1.0 for the first step); `overall_conversion_rate` is always
/// `count_last / count_0`. A single-step funnel has an overall conversion
/// of 1.0.
pub fn shape_funnel(
    envelope: &Value,
    funnel_id: u64,
    funnel_name: &str,
    from: &str,
    to: &str,
) -> Result<FunnelResult> {
    let root = require_object(envelope, "funnel envelope")?;
    let steps_value = require_field(root, "steps")?;
    let raw_steps = steps_value
        .as_array()
        .ok_or_else(|| protocol("funnel.steps: expected an array"))?;

    let mut steps = Vec::with_capacity(raw_steps.len());
    let mut counts = Vec::with_capacity(raw_steps.len());

    for (index, step_value) in raw_steps.iter().enumerate() {
        let step_obj = require_object(step_value, "funnel step")?;
        let event = require_field(step_obj, "event")?
            .as_str()
            .ok_or_else(|| protocol("funnel step `event`: expected a string"))?
            .to_string();
        let count = require_i64(require_field(step_obj, "count")?, "funnel step count")?;
        counts.push(count);

        let conversion_rate_from_previous = if index == 0 {
            1.0
        } else {
            let previous = counts[index - 1];
            if previous == 0 {
                0.0
            } else {
                count as f64 / previous as f64
            }
        };

        steps.push(FunnelStepReport {
            event,
            step_index: index as u32,
            absolute_count: count,
            conversion_rate_from_previous,
        });
    }

    let overall_conversion_rate = match (counts.first(), counts.last()) {
        (Some(0), _) => 0.0,
        (Some(first), Some(last)) if counts.len() > 1 => *last as f64 / *first as f64,
        _ => 1.0,
    };

    Ok(FunnelResult {
        funnel_id,
        funnel_name: funnel_name.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        overall_conversion_rate,
        steps,
    })
}

/// Shapes a `/query/retention` envelope: a mapping from cohort-date to
/// `{count, "0": retained, "1": retained, ...}`.
///
/// A missing period index means the period has not yet elapsed for that
/// cohort and is omitted from the cohort's `retention` array rather than
/// reported as zero.
pub fn shape_retention(
    envelope: &Value,
    born_event: &str,
    return_event: Option<String>,
    from: &str,
    to: &str,
    interval: RetentionInterval,
    interval_count: u32,
) -> Result<RetentionResult> {
    let root = require_object(envelope, "retention envelope")?;

    let mut cohorts = Vec::with_capacity(root.len());
    for (cohort_date, cohort_value) in root.iter() {
        let cohort_obj = require_object(cohort_value, "retention cohort")?;
        let size = require_i64(require_field(cohort_obj, "count")?, "retention cohort count")?;

        let mut retention = Vec::new();
        for period in 0..interval_count {
            let key = period.to_string();
            match cohort_obj.get(&key) {
                Some(value) => {
                    let retained = require_i64(value, "retention period count")?;
                    let rate = if size > 0 {
                        retained as f64 / size as f64
                    } else {
                        0.0
                    };
                    retention.push(rate);
                }
                None => break,
            }
        }

        cohorts.push(RetentionCohort {
            cohort_date: cohort_date.clone(),
            size,
            retention,
        });
    }

    Ok(RetentionResult {
        born_event: born_event.to_string(),
        return_event,
        from: from.to_string(),
        to: to.to_string(),
        interval,
        interval_count,
        cohorts,
    })
}

/// Shapes a `/query/retention/properties` envelope into a
/// [`FrequencyResult`] ("addiction curve"): `data[bucket]` is an array
/// where index N is the count of users active in at least N+1 sub-periods.
pub fn shape_frequency(
    envelope: &Value,
    event: Option<String>,
    from: &str,
    to: &str,
    outer_unit: OuterUnit,
    granularity: Granularity,
) -> Result<FrequencyResult> {
    let root = require_object(envelope, "frequency envelope")?;

    let mut data: IndexMap<String, Vec<i64>> = IndexMap::new();
    for (bucket_key, array_value) in root.iter() {
        let array = array_value
            .as_array()
            .ok_or_else(|| protocol("frequency bucket value: expected an array"))?;
        let mut counts = Vec::with_capacity(array.len());
        for item in array {
            counts.push(require_i64(item, "frequency count")?);
        }
        data.insert(bucket_key.clone(), counts);
    }

    Ok(FrequencyResult {
        event,
        from: from.to_string(),
        to: to.to_string(),
        outer_unit,
        granularity,
        data,
    })
}

/// Shapes a `/query/segmentation/numeric` envelope. Bucket label order
/// follows the Provider's own iteration order (`serde_json`'s
/// `preserve_order` feature plus `IndexMap` keep this faithful).
pub fn shape_numeric_bucket(
    envelope: &Value,
    event: &str,
    from: &str,
    to: &str,
    property_expression: &str,
    unit: NumericUnit,
) -> Result<NumericBucketResult> {
    let root = require_object(envelope, "numeric bucket envelope")?;
    let values = require_object(require_field(root, "values")?, "numeric.values")?;

    let mut series: IndexMap<String, IndexMap<String, i64>> = IndexMap::new();
    for (label, buckets_value) in values.iter() {
        let buckets = require_object(buckets_value, "numeric.values.<label>")?;
        let mut bucket_map = IndexMap::new();
        for (bucket_key, count_value) in buckets.iter() {
            bucket_map.insert(bucket_key.clone(), require_i64(count_value, "numeric count")?);
        }
        series.insert(label.clone(), bucket_map);
    }

    Ok(NumericBucketResult {
        event: event.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        property_expression: property_expression.to_string(),
        unit,
        series,
    })
}

fn require_f64(value: &Value, what: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| protocol(format!("{what}: expected a number")))
}

/// Shapes a `/query/segmentation/sum` envelope.
pub fn shape_numeric_sum(
    envelope: &Value,
    event: &str,
    from: &str,
    to: &str,
    property_expression: &str,
    unit: NumericUnit,
) -> Result<NumericSumResult> {
    let root = require_object(envelope, "numeric sum envelope")?;
    let values = require_object(require_field(root, "values")?, "numeric.values")?;

    let mut results = IndexMap::new();
    for (bucket_key, value) in values.iter() {
        results.insert(bucket_key.clone(), require_f64(value, "numeric sum")?);
    }

    let computed_at = match root.get("computed_at") {
        Some(Value::String(s)) => Some(
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| protocol(format!("invalid computed_at: {e}")))?,
        ),
        _ => None,
    };

    Ok(NumericSumResult {
        event: event.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        property_expression: property_expression.to_string(),
        unit,
        results,
        computed_at,
    })
}

/// Shapes a `/query/segmentation/average` envelope.
pub fn shape_numeric_average(
    envelope: &Value,
    event: &str,
    from: &str,
    to: &str,
    property_expression: &str,
    unit: NumericUnit,
) -> Result<NumericAverageResult> {
    let root = require_object(envelope, "numeric average envelope")?;
    let values = require_object(require_field(root, "values")?, "numeric.values")?;

    let mut results = IndexMap::new();
    for (bucket_key, value) in values.iter() {
        results.insert(bucket_key.clone(), require_f64(value, "numeric average")?);
    }

    Ok(NumericAverageResult {
        event: event.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        property_expression: property_expression.to_string(),
        unit,
        results,
    })
}

/// Shapes a `/query/stream/query` (activity feed) envelope.
pub fn shape_activity_feed(
    envelope: &Value,
    distinct_ids: Vec<String>,
    from: Option<String>,
    to: Option<String>,
) -> Result<ActivityFeedResult> {
    let root = require_object(envelope, "activity feed envelope")?;
    let raw_events = require_field(root, "events")?
        .as_array()
        .ok_or_else(|| protocol("activity feed `events`: expected an array"))?;

    let mut events = Vec::with_capacity(raw_events.len());
    for event_value in raw_events {
        let event_obj = require_object(event_value, "activity feed event")?;
        let event_name = require_field(event_obj, "event")?
            .as_str()
            .ok_or_else(|| protocol("activity feed event `event`: expected a string"))?
            .to_string();
        let time_secs = require_i64(require_field(event_obj, "time")?, "activity feed event time")?;
        let time = DateTime::<Utc>::from_timestamp(time_secs, 0)
            .ok_or_else(|| protocol(format!("activity feed event time out of range: {time_secs}")))?;
        let mut properties = event_obj.clone();
        properties.remove("event");
        properties.remove("time");

        events.push(UserEvent {
            event_name,
            time,
            properties,
        });
    }

    Ok(ActivityFeedResult {
        distinct_ids,
        from,
        to,
        events,
    })
}

/// Shapes a saved-report (bookmark / Insights) envelope.
pub fn shape_saved_report(
    envelope: &Value,
    bookmark_id: u64,
    report_type: &str,
    from: &str,
    to: &str,
) -> Result<SavedReportResult> {
    let root = require_object(envelope, "saved report envelope")?;
    let data = require_object(require_field(root, "data")?, "saved_report.data")?;
    let headers_value = require_field(data, "series")?;
    let headers = headers_value
        .as_array()
        .ok_or_else(|| protocol("saved_report.data.series: expected an array"))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| protocol("saved_report header: expected a string"))
        })
        .collect::<Result<Vec<String>>>()?;

    let values = require_object(require_field(data, "values")?, "saved_report.data.values")?;
    let mut series: IndexMap<String, IndexMap<String, i64>> = IndexMap::new();
    for (label, buckets_value) in values.iter() {
        let buckets = require_object(buckets_value, "saved_report.data.values.<label>")?;
        let mut bucket_map = IndexMap::new();
        for (bucket_key, count_value) in buckets.iter() {
            bucket_map.insert(bucket_key.clone(), require_i64(count_value, "saved report count")?);
        }
        series.insert(label.clone(), bucket_map);
    }

    let computed_at = Utc::now();

    Ok(SavedReportResult {
        bookmark_id,
        report_type: report_type.to_string(),
        computed_at,
        from: from.to_string(),
        to: to.to_string(),
        headers,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn segmentation_scenario_a() {
        let envelope = json!({
            "data": {
                "series": ["2026-01-01", "2026-01-02", "2026-01-03"],
                "values": {
                    "signup": {
                        "2026-01-01": 100,
                        "2026-01-02": 150,
                        "2026-01-03": 200
                    }
                }
            }
        });

        let result = shape_segmentation(
            &envelope,
            "signup",
            "2026-01-01",
            "2026-01-03",
            SegmentationUnit::Day,
            None,
        )
        .unwrap();

        assert_eq!(result.total, 450);
        assert_eq!(result.series["signup"]["2026-01-01"], 100);
        assert_eq!(result.series["signup"]["2026-01-03"], 200);
    }

    #[test]
    fn funnel_scenario_b() {
        let envelope = json!({
            "steps": [
                {"event": "view", "count": 1000},
                {"event": "add_to_cart", "count": 400},
                {"event": "purchase", "count": 200},
            ]
        });

        let result = shape_funnel(&envelope, 1, "checkout", "2026-01-01", "2026-01-07").unwrap();

        assert_eq!(result.overall_conversion_rate, 0.20);
        assert_eq!(result.steps[1].conversion_rate_from_previous, 0.40);
        assert_eq!(result.steps[2].conversion_rate_from_previous, 0.50);
    }

    #[test]
    fn funnel_single_step_has_conversion_one() {
        let envelope = json!({"steps": [{"event": "view", "count": 500}]});
        let result = shape_funnel(&envelope, 1, "f", "2026-01-01", "2026-01-01").unwrap();
        assert_eq!(result.overall_conversion_rate, 1.0);
        assert_eq!(result.steps[0].conversion_rate_from_previous, 1.0);
    }

    #[test]
    fn funnel_empty_first_step_has_zero_conversion() {
        let envelope = json!({"steps": [
            {"event": "view", "count": 0},
            {"event": "buy", "count": 0},
        ]});
        let result = shape_funnel(&envelope, 1, "f", "2026-01-01", "2026-01-01").unwrap();
        assert_eq!(result.overall_conversion_rate, 0.0);
        assert_eq!(result.steps[1].conversion_rate_from_previous, 0.0);
    }

    #[test]
    fn retention_omits_not_yet_elapsed_periods() {
        let envelope = json!({
            "2026-01-01": {"count": 100, "0": 100, "1": 40}
        });
        let result = shape_retention(
            &envelope,
            "signup",
            None,
            "2026-01-01",
            "2026-01-10",
            RetentionInterval::Day,
            5,
        )
        .unwrap();

        assert_eq!(result.cohorts[0].retention.len(), 2);
        assert_eq!(result.cohorts[0].retention[0], 1.0);
        assert_eq!(result.cohorts[0].retention[1], 0.4);
    }

    #[test]
    fn frequency_is_non_increasing_passthrough() {
        let envelope = json!({"2026-01-01": [500, 300, 100, 10]});
        let result = shape_frequency(
            &envelope,
            Some("signup".to_string()),
            "2026-01-01",
            "2026-01-07",
            OuterUnit::Week,
            Granularity::Day,
        )
        .unwrap();
        assert_eq!(result.data["2026-01-01"], vec![500, 300, 100, 10]);
    }

    #[test]
    fn malformed_segmentation_is_protocol_error() {
        let envelope = json!({"data": {}});
        let err = shape_segmentation(
            &envelope,
            "signup",
            "2026-01-01",
            "2026-01-01",
            SegmentationUnit::Day,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::Protocol(_)));
    }

    #[test]
    fn numeric_bucket_preserves_insertion_order() {
        let envelope = json!({
            "values": {
                "100 - 200": {"2026-01-01": 5},
                "0 - 100": {"2026-01-01": 9},
            }
        });
        let result = shape_numeric_bucket(
            &envelope,
            "purchase",
            "2026-01-01",
            "2026-01-01",
            "amount",
            NumericUnit::Day,
        )
        .unwrap();
        let labels: Vec<&String> = result.series.keys().collect();
        assert_eq!(labels, vec!["100 - 200", "0 - 100"]);
    }
}
