//! Event record types: the normalized shape used throughout the crate and
//! the raw Provider envelope it is derived from.

use super::units::PropertyMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exactly the Provider's event-export envelope: the event name plus a flat
/// property bag that still carries `distinct_id`, `time`, and `$insert_id`
/// alongside caller-defined attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEventRecord {
    /// The event name.
    pub event: String,
    /// Provider-native property bag, pre-normalization.
    pub properties: PropertyMap,
}

/// A normalized event record: identity fields lifted out of `properties`
/// into named fields, everything else left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// The event name.
    pub event_name: String,
    /// UTC instant the event occurred, converted from the Provider's epoch
    /// seconds representation.
    pub event_time: DateTime<Utc>,
    /// The user or entity the event is attributed to.
    pub distinct_id: String,
    /// Provider-assigned deduplication id; synthesized as a fresh UUIDv4
    /// if the raw record carried none.
    pub insert_id: String,
    /// Remaining caller-defined properties, with `distinct_id`, `time`,
    /// and `$insert_id` excluded.
    pub properties: PropertyMap,
}

impl EventRecord {
    /// Normalizes a raw Provider event record.
    ///
    /// Lifts `distinct_id`, `time` (epoch seconds → UTC instant), and
    /// `$insert_id` (synthesizing a UUIDv4 when absent) out of
    /// `properties`, carrying the event name up unchanged. Applying this
    /// to an already-normalized record's raw form again is a no-op:
    /// the excluded keys are removed, not merely read.
    pub fn from_raw(raw: RawEventRecord) -> crate::errors::Result<Self> {
        let mut properties = raw.properties;

        let distinct_id = properties
            .remove("distinct_id")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let time_secs = properties
            .remove("time")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                crate::errors::AnalyticsError::Protocol(
                    "event record missing numeric `time` property".to_string(),
                )
            })?;
        let event_time = DateTime::<Utc>::from_timestamp(time_secs, 0).ok_or_else(|| {
            crate::errors::AnalyticsError::Protocol(format!(
                "event record `time` out of range: {time_secs}"
            ))
        })?;

        let insert_id = properties
            .remove("$insert_id")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            event_name: raw.event,
            event_time,
            distinct_id,
            insert_id,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(event: &str, props: serde_json::Value) -> RawEventRecord {
        RawEventRecord {
            event: event.to_string(),
            properties: props.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn normalizes_identity_fields() {
        let record = raw(
            "signup",
            json!({
                "distinct_id": "user-1",
                "time": 1_700_000_000,
                "$insert_id": "abc-123",
                "plan": "pro",
            }),
        );

        let normalized = EventRecord::from_raw(record).unwrap();
        assert_eq!(normalized.event_name, "signup");
        assert_eq!(normalized.distinct_id, "user-1");
        assert_eq!(normalized.insert_id, "abc-123");
        assert_eq!(
            normalized.properties.get("plan").unwrap().as_str(),
            Some("pro")
        );
        assert!(normalized.properties.get("distinct_id").is_none());
        assert!(normalized.properties.get("time").is_none());
        assert!(normalized.properties.get("$insert_id").is_none());
    }

    #[test]
    fn synthesizes_insert_id_when_absent() {
        let record = raw(
            "click",
            json!({
                "distinct_id": "user-2",
                "time": 1_700_000_100,
            }),
        );
        let normalized = EventRecord::from_raw(record).unwrap();
        assert_eq!(normalized.insert_id.len(), 36);
    }

    #[test]
    fn missing_time_is_protocol_error() {
        let record = raw("click", json!({"distinct_id": "u"}));
        let err = EventRecord::from_raw(record).unwrap_err();
        assert!(matches!(err, crate::errors::AnalyticsError::Protocol(_)));
    }
}
