//! Lazy, single-pass streaming export of events and profiles.
//!
//! Both record kinds are exposed as a raw variant (the Provider's envelope,
//! unmodified) and a normalized variant, as two separately named methods
//! rather than a boolean `raw` flag — Rust's `impl Stream<Item = T>` return
//! position can't express "T depends on a runtime bool" without boxing both
//! arms behind a trait object, so the split keeps each method's item type
//! concrete.

use crate::errors::Result;
use crate::models::{EventRecord, ProfileRecord, RawEventRecord, RawProfileRecord};
use crate::transport::{EndpointKind, EngageFilters, Transport};
use async_stream::try_stream;
use futures::Stream;

/// Parameters for an event export over a date range.
#[derive(Debug, Clone, Default)]
pub struct EventRangeQuery {
    pub from: String,
    pub to: String,
    /// Restrict to these event names, if non-empty.
    pub events: Vec<String>,
    pub where_clause: Option<String>,
}

impl EventRangeQuery {
    fn params(&self) -> Result<Vec<(&'static str, String)>> {
        let mut params = vec![
            ("from_date", self.from.clone()),
            ("to_date", self.to.clone()),
        ];
        if !self.events.is_empty() {
            let encoded = serde_json::to_string(&self.events)?;
            params.push(("event", encoded));
        }
        if let Some(w) = &self.where_clause {
            params.push(("where", w.clone()));
        }
        Ok(params)
    }
}

/// Streams raw event-export records for `query.from..=query.to` exactly as
/// the Provider returns them, with no field promotion.
pub fn stream_events_raw(
    transport: Transport,
    query: EventRangeQuery,
) -> impl Stream<Item = Result<RawEventRecord>> {
    try_stream! {
        let params = query.params()?;
        let mut ndjson = transport
            .stream_ndjson(EndpointKind::Export, "/export", &params)
            .await?;

        use futures::StreamExt;
        while let Some(value) = ndjson.next().await {
            let value = value?;
            let raw: RawEventRecord = serde_json::from_value(value)?;
            yield raw;
        }
    }
}

/// Streams normalized event records for `query.from..=query.to`.
///
/// Normalization lifts `distinct_id`, `time`, and `$insert_id` out of
/// `properties` into named fields (see [`EventRecord::from_raw`]).
pub fn stream_events(
    transport: Transport,
    query: EventRangeQuery,
) -> impl Stream<Item = Result<EventRecord>> {
    try_stream! {
        use futures::StreamExt;
        let mut raw_stream = Box::pin(stream_events_raw(transport, query));
        while let Some(raw) = raw_stream.next().await {
            yield EventRecord::from_raw(raw?)?;
        }
    }
}

/// Streams raw profile records, transparently concatenating the Provider's
/// paged `/query/engage` responses.
pub fn stream_profiles_raw(
    transport: Transport,
    filters: EngageFilters,
) -> impl Stream<Item = Result<RawProfileRecord>> {
    try_stream! {
        let first = transport.query_engage_page(0, None, &filters).await?;
        let session_id = first.session_id.clone();
        let page_size = first.page_size.max(1);
        let total_pages = first.total.div_ceil(page_size);

        for value in first.results {
            yield serde_json::from_value::<RawProfileRecord>(value)?;
        }

        for page in 1..total_pages {
            let envelope = transport
                .query_engage_page(page, Some(&session_id), &filters)
                .await?;
            for value in envelope.results {
                yield serde_json::from_value::<RawProfileRecord>(value)?;
            }
        }
    }
}

/// Streams normalized profile records (see [`ProfileRecord::from_raw`]).
pub fn stream_profiles(
    transport: Transport,
    filters: EngageFilters,
) -> impl Stream<Item = Result<ProfileRecord>> {
    try_stream! {
        use futures::StreamExt;
        let mut raw_stream = Box::pin(stream_profiles_raw(transport, filters));
        while let Some(raw) = raw_stream.next().await {
            yield ProfileRecord::from_raw(raw?)?;
        }
    }
}
