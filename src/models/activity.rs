//! Activity feed query result.

use super::units::PropertyMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single event within an activity feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEvent {
    pub event_name: String,
    pub time: DateTime<Utc>,
    pub properties: PropertyMap,
}

/// Result of an activity feed query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityFeedResult {
    pub distinct_ids: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Ordered as the Provider returned them.
    pub events: Vec<UserEvent>,
}
