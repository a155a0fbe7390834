//! Profile record types: normalized shape and raw Provider `$engage`
//! envelope.

use super::units::PropertyMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exactly the Provider's profile envelope under `/query/engage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProfileRecord {
    #[serde(rename = "$distinct_id")]
    pub distinct_id: String,
    #[serde(rename = "$properties")]
    pub properties: PropertyMap,
}

/// A normalized profile record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRecord {
    /// The profile's distinct id.
    pub distinct_id: String,
    /// Last time this profile was updated, if the Provider supplied one.
    pub last_seen: Option<DateTime<Utc>>,
    /// Remaining properties, with `$last_seen` excluded.
    pub properties: PropertyMap,
}

impl ProfileRecord {
    /// Normalizes a raw Provider profile record, lifting `$distinct_id`
    /// and `$last_seen` into named fields.
    pub fn from_raw(raw: RawProfileRecord) -> crate::errors::Result<Self> {
        let mut properties = raw.properties;

        let last_seen = match properties.remove("$last_seen") {
            Some(serde_json::Value::String(s)) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        crate::errors::AnalyticsError::Protocol(format!(
                            "invalid $last_seen timestamp: {e}"
                        ))
                    })?,
            ),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                return Err(crate::errors::AnalyticsError::Protocol(format!(
                    "unexpected $last_seen value kind: {other}"
                )))
            }
        };

        Ok(Self {
            distinct_id: raw.distinct_id,
            last_seen,
            properties,
        })
    }
}
