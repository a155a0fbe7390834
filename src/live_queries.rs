//! One method per Provider Live Query endpoint, as inherent methods on
//! [`Workspace`]. Each issues exactly one request, shapes the envelope
//! through [`crate::result_shaping`], and returns a typed result.
//!
//! Three known-good contracts from the design notes are preserved here,
//! deliberately diverging from what a naive port of the source client
//! would do:
//! - [`Workspace::activity_feed`] calls the dedicated activity endpoint
//!   directly and caps results with a plain `Vec::truncate`, never routing
//!   through the scripting endpoint.
//! - [`Workspace::frequency`] calls `/query/retention/properties`, not
//!   segmentation.
//! - [`Workspace::list_profile_properties`] calls `/query/engage/properties`
//!   regardless of whether an event is supplied.

use crate::errors::{AnalyticsError, Result};
use crate::models::units::{
    Granularity, NumericUnit, OuterUnit, RetentionInterval, SegmentationUnit,
};
use crate::models::{
    ActivityFeedResult, FrequencyResult, FunnelResult, NumericAverageResult, NumericBucketResult,
    NumericSumResult, RetentionResult, SavedReportResult, SegmentationResult,
};
use crate::result_shaping;
use crate::transport::EndpointKind;
use crate::workspace::Workspace;
use reqwest::Method;
use serde_json::Value;

/// Response bodies this crate will not attempt to shape past this size;
/// currently only `list_saved_reports` enforces it (spec'd ceiling for
/// saved-report listings, see module docs).
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

fn date_params(from: &str, to: &str) -> Vec<(&'static str, String)> {
    vec![("from_date", from.to_string()), ("to_date", to.to_string())]
}

fn as_string_array(value: &Value, field: &str) -> Result<Vec<String>> {
    value
        .as_array()
        .ok_or_else(|| AnalyticsError::Protocol(format!("{field}: expected an array")))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| AnalyticsError::Protocol(format!("{field}: expected string items")))
        })
        .collect()
}

fn as_value_array(value: &Value, field: &str) -> Result<Vec<Value>> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| AnalyticsError::Protocol(format!("{field}: expected an array")))
}

impl Workspace {
    /// `GET /query/events/names` — every event name the project has seen.
    pub async fn list_event_names(&self) -> Result<Vec<String>> {
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/events/names", &[], None)
            .await?;
        as_string_array(&envelope, "event names envelope")
    }

    /// `GET /query/events/properties` — property names seen on `event`.
    pub async fn list_event_properties(&self, event: &str) -> Result<Vec<String>> {
        let params = [("event", event.to_string())];
        let envelope = self
            .transport()
            .request(
                Method::GET,
                EndpointKind::Query,
                "/query/events/properties",
                &params,
                None,
            )
            .await?;
        as_string_array(&envelope, "event properties envelope")
    }

    /// `GET /query/events/properties/values` — sample values observed for
    /// `event`'s `property`, capped at `limit` (Provider default if
    /// omitted).
    pub async fn list_event_property_values(
        &self,
        event: &str,
        property: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Value>> {
        let mut params = vec![
            ("event", event.to_string()),
            ("name", property.to_string()),
        ];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let envelope = self
            .transport()
            .request(
                Method::GET,
                EndpointKind::Query,
                "/query/events/properties/values",
                &params,
                None,
            )
            .await?;
        as_value_array(&envelope, "event property values envelope")
    }

    /// `GET /query/events/top` — the project's most frequent events.
    pub async fn top_events(&self, limit: Option<u32>) -> Result<Vec<Value>> {
        let mut params = Vec::new();
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/events/top", &params, None)
            .await?;
        as_value_array(&envelope, "top events envelope")
    }

    /// `GET /query/funnels/list` — every funnel definition in the project.
    pub async fn list_funnels(&self) -> Result<Vec<Value>> {
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/funnels/list", &[], None)
            .await?;
        as_value_array(&envelope, "funnel list envelope")
    }

    /// `GET /query/funnels` — computes a funnel over `[from, to]`.
    pub async fn funnel(&self, funnel_id: u64, funnel_name: &str, from: &str, to: &str) -> Result<FunnelResult> {
        let mut params = date_params(from, to);
        params.push(("funnel_id", funnel_id.to_string()));
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/funnels", &params, None)
            .await?;
        result_shaping::shape_funnel(&envelope, funnel_id, funnel_name, from, to)
    }

    /// `GET /query/cohorts/list` — every cohort definition in the project.
    pub async fn list_cohorts(&self) -> Result<Vec<Value>> {
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/cohorts/list", &[], None)
            .await?;
        as_value_array(&envelope, "cohort list envelope")
    }

    /// `GET /query/bookmarks/list` — saved report (bookmark) definitions.
    ///
    /// Supports `offset`/`limit` paging and an optional field projection
    /// so the caller can stay under the uniform-response ceiling; if the
    /// Provider's own (pre-projection) body already exceeds it, this
    /// returns `AnalyticsError::Query` rather than silently truncating.
    pub async fn list_bookmarks(
        &self,
        offset: Option<u32>,
        limit: Option<u32>,
        fields: Option<&[&str]>,
    ) -> Result<Vec<Value>> {
        let mut params = Vec::new();
        if let Some(offset) = offset {
            params.push(("offset", offset.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/bookmarks/list", &params, None)
            .await?;

        let size = serde_json::to_vec(&envelope).map(|b| b.len()).unwrap_or(0);
        if size > MAX_RESPONSE_BYTES {
            return Err(AnalyticsError::Query(format!(
                "saved-report listing is {size} bytes, over the {MAX_RESPONSE_BYTES}-byte ceiling; \
                 narrow with offset/limit or a field projection"
            )));
        }

        let items = as_value_array(&envelope, "bookmark list envelope")?;
        Ok(match fields {
            Some(fields) => items.into_iter().map(|item| project_fields(item, fields)).collect(),
            None => items,
        })
    }

    /// `GET /query/engage/properties` — profile property names.
    ///
    /// Always calls the profile-properties endpoint, with or without an
    /// event context; the source client's `list_properties` wrongly
    /// returned an empty list here when no event was given (it called the
    /// *event* property endpoint, which has nothing to say about
    /// profiles).
    pub async fn list_profile_properties(&self) -> Result<Vec<String>> {
        let envelope = self
            .transport()
            .request(
                Method::GET,
                EndpointKind::Query,
                "/query/engage/properties",
                &[],
                None,
            )
            .await?;
        as_string_array(&envelope, "profile properties envelope")
    }

    /// `GET /query/insights` — executes a saved Insights report (bookmark).
    pub async fn saved_report(
        &self,
        bookmark_id: u64,
        report_type: &str,
        from: &str,
        to: &str,
    ) -> Result<SavedReportResult> {
        let mut params = date_params(from, to);
        params.push(("bookmark_id", bookmark_id.to_string()));
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/insights", &params, None)
            .await?;
        result_shaping::shape_saved_report(&envelope, bookmark_id, report_type, from, to)
    }

    /// `GET /query/segmentation` — event counts bucketed over time,
    /// optionally segmented by `on`'s values and restricted by `where`.
    pub async fn segmentation(
        &self,
        event: &str,
        from: &str,
        to: &str,
        unit: SegmentationUnit,
        on: Option<String>,
        where_clause: Option<String>,
    ) -> Result<SegmentationResult> {
        let mut params = date_params(from, to);
        params.push(("event", event.to_string()));
        params.push(("unit", unit.as_provider_str().to_string()));
        if let Some(on) = &on {
            params.push(("on", on.clone()));
        }
        if let Some(w) = &where_clause {
            params.push(("where", w.clone()));
        }
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/segmentation", &params, None)
            .await?;
        result_shaping::shape_segmentation(&envelope, event, from, to, unit, on)
    }

    /// `GET /query/segmentation/multi` — event counts for several events
    /// at once, serialized as a JSON array per spec.md §6.
    pub async fn segmentation_multi(
        &self,
        events: &[String],
        from: &str,
        to: &str,
        unit: SegmentationUnit,
    ) -> Result<SegmentationResult> {
        let mut params = date_params(from, to);
        params.push(("events", serde_json::to_string(events)?));
        params.push(("unit", unit.as_provider_str().to_string()));
        let envelope = self
            .transport()
            .request(
                Method::GET,
                EndpointKind::Query,
                "/query/segmentation/multi",
                &params,
                None,
            )
            .await?;
        let label = events.join(",");
        result_shaping::shape_segmentation(&envelope, &label, from, to, unit, None)
    }

    /// `GET /query/segmentation/numeric` — counts bucketed both by a
    /// numeric-value bucket label and by time.
    pub async fn segmentation_numeric(
        &self,
        event: &str,
        from: &str,
        to: &str,
        property_expression: &str,
        unit: NumericUnit,
    ) -> Result<NumericBucketResult> {
        let mut params = date_params(from, to);
        params.push(("event", event.to_string()));
        params.push(("on", property_expression.to_string()));
        params.push(("unit", unit.as_provider_str().to_string()));
        let envelope = self
            .transport()
            .request(
                Method::GET,
                EndpointKind::Query,
                "/query/segmentation/numeric",
                &params,
                None,
            )
            .await?;
        result_shaping::shape_numeric_bucket(&envelope, event, from, to, property_expression, unit)
    }

    /// `GET /query/segmentation/sum` — sums `property_expression` per bucket.
    pub async fn segmentation_sum(
        &self,
        event: &str,
        from: &str,
        to: &str,
        property_expression: &str,
        unit: NumericUnit,
    ) -> Result<NumericSumResult> {
        let mut params = date_params(from, to);
        params.push(("event", event.to_string()));
        params.push(("on", property_expression.to_string()));
        params.push(("unit", unit.as_provider_str().to_string()));
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/segmentation/sum", &params, None)
            .await?;
        result_shaping::shape_numeric_sum(&envelope, event, from, to, property_expression, unit)
    }

    /// `GET /query/segmentation/average` — averages `property_expression`
    /// per bucket.
    pub async fn segmentation_average(
        &self,
        event: &str,
        from: &str,
        to: &str,
        property_expression: &str,
        unit: NumericUnit,
    ) -> Result<NumericAverageResult> {
        let mut params = date_params(from, to);
        params.push(("event", event.to_string()));
        params.push(("on", property_expression.to_string()));
        params.push(("unit", unit.as_provider_str().to_string()));
        let envelope = self
            .transport()
            .request(
                Method::GET,
                EndpointKind::Query,
                "/query/segmentation/average",
                &params,
                None,
            )
            .await?;
        result_shaping::shape_numeric_average(&envelope, event, from, to, property_expression, unit)
    }

    /// `GET /query/retention` — cohort retention over `[from, to]`.
    pub async fn retention(
        &self,
        born_event: &str,
        return_event: Option<String>,
        from: &str,
        to: &str,
        interval: RetentionInterval,
        interval_count: u32,
    ) -> Result<RetentionResult> {
        let mut params = date_params(from, to);
        params.push(("born_event", born_event.to_string()));
        params.push(("unit", interval.as_provider_str().to_string()));
        params.push(("interval_count", interval_count.to_string()));
        if let Some(return_event) = &return_event {
            params.push(("event", return_event.clone()));
        }
        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/retention", &params, None)
            .await?;
        result_shaping::shape_retention(&envelope, born_event, return_event, from, to, interval, interval_count)
    }

    /// `GET /query/retention/properties` — the "addiction curve".
    ///
    /// Calls the frequency/retention-properties endpoint directly; the
    /// source client routed this through segmentation instead, which
    /// cannot express the addiction-curve shape at all.
    pub async fn frequency(
        &self,
        event: Option<String>,
        from: &str,
        to: &str,
        outer_unit: OuterUnit,
        granularity: Granularity,
    ) -> Result<FrequencyResult> {
        let mut params = date_params(from, to);
        params.push(("unit", outer_unit.as_provider_str().to_string()));
        params.push(("addiction_unit", granularity.as_provider_str().to_string()));
        if let Some(event) = &event {
            params.push(("event", event.clone()));
        }
        let envelope = self
            .transport()
            .request(
                Method::GET,
                EndpointKind::Query,
                "/query/retention/properties",
                &params,
                None,
            )
            .await?;
        result_shaping::shape_frequency(&envelope, event, from, to, outer_unit, granularity)
    }

    /// `POST /query/jql` — runs a scripting-endpoint query, returning the
    /// raw JSON result verbatim (JQL scripts can return arbitrary shapes,
    /// so this is intentionally untyped).
    pub async fn jql(&self, script: &str, params: Option<Value>) -> Result<Value> {
        let body = serde_json::json!({
            "script": script,
            "params": params.unwrap_or(Value::Null),
        });
        self.transport()
            .request(Method::POST, EndpointKind::Query, "/query/jql", &[], Some(&body))
            .await
    }

    /// `GET /query/stream/query` — the activity feed for `distinct_ids`.
    ///
    /// `cap`, if given, truncates the shaped event list with a plain
    /// `Vec::truncate` after the dedicated activity endpoint responds —
    /// never via the JQL scripting endpoint's `.take(n)` combinator,
    /// which the scripting engine does not actually define.
    pub async fn activity_feed(
        &self,
        distinct_ids: Vec<String>,
        from: Option<String>,
        to: Option<String>,
        cap: Option<usize>,
    ) -> Result<ActivityFeedResult> {
        let mut params = vec![("distinct_ids", serde_json::to_string(&distinct_ids)?)];
        if let Some(from) = &from {
            params.push(("from_date", from.clone()));
        }
        if let Some(to) = &to {
            params.push(("to_date", to.clone()));
        }

        let envelope = self
            .transport()
            .request(Method::GET, EndpointKind::Query, "/query/stream/query", &params, None)
            .await?;

        let mut result = result_shaping::shape_activity_feed(&envelope, distinct_ids, from, to)?;
        if let Some(cap) = cap {
            result.events.truncate(cap);
        }
        Ok(result)
    }
}

fn project_fields(item: Value, fields: &[&str]) -> Value {
    let Some(obj) = item.as_object() else {
        return item;
    };
    let projected: serde_json::Map<String, Value> = fields
        .iter()
        .filter_map(|field| obj.get(*field).map(|v| (field.to_string(), v.clone())))
        .collect();
    Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_fields_keeps_only_requested_keys() {
        let item = json!({"id": 1, "name": "weekly signups", "internal": "secret"});
        let projected = project_fields(item, &["id", "name"]);
        assert_eq!(projected, json!({"id": 1, "name": "weekly signups"}));
    }

    #[test]
    fn project_fields_on_non_object_is_passthrough() {
        let item = json!("not an object");
        assert_eq!(project_fields(item.clone(), &["id"]), item);
    }
}
