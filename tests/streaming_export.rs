//! Exercises `stream_events`/`stream_events_raw` against a mocked
//! `/export` endpoint: NDJSON decode, and that normalization is
//! idempotent on an already-normalized record's raw form.

mod common;

use analytics_client_runtime::models::{EventRecord, RawEventRecord};
use analytics_client_runtime::storage::StoreLocation;
use analytics_client_runtime::streaming::{stream_events, stream_events_raw, EventRangeQuery};
use analytics_client_runtime::transport::{Transport, TransportConfig};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ndjson_body(lines: &[serde_json::Value]) -> String {
    lines
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn export_transport(mock_uri: &str) -> Transport {
    let credentials = common::test_credentials();
    let mut config = TransportConfig::default();
    config.export_base_url = Some(mock_uri.to_string());
    config.query_base_url = Some(mock_uri.to_string());
    Transport::new(credentials, config).unwrap()
}

#[tokio::test]
async fn raw_stream_matches_ndjson_decoded_once() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    let fixture = vec![
        json!({"event": "signup", "properties": {"distinct_id": "u1", "time": 1_700_000_000, "$insert_id": "a1", "plan": "pro"}}),
        json!({"event": "purchase", "properties": {"distinct_id": "u2", "time": 1_700_000_100, "$insert_id": "a2", "amount": 9.99}}),
    ];

    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson_body(&fixture)))
        .mount(&mock_server)
        .await;

    let transport = export_transport(&mock_server.uri()).await;
    let query = EventRangeQuery {
        from: "2026-01-01".into(),
        to: "2026-01-01".into(),
        events: Vec::new(),
        where_clause: None,
    };

    let records: Vec<RawEventRecord> = stream_events_raw(transport, query)
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].event, "signup");
    assert_eq!(
        records[0].properties.get("distinct_id").unwrap().as_str(),
        Some("u1")
    );
    assert_eq!(records[1].event, "purchase");
}

#[tokio::test]
async fn normalization_is_idempotent_on_already_normalized_records() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    let fixture = vec![json!({
        "event": "signup",
        "properties": {"distinct_id": "u1", "time": 1_700_000_000, "$insert_id": "fixed-id", "plan": "pro"},
    })];

    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson_body(&fixture)))
        .mount(&mock_server)
        .await;

    let transport = export_transport(&mock_server.uri()).await;
    let query = EventRangeQuery {
        from: "2026-01-01".into(),
        to: "2026-01-01".into(),
        events: Vec::new(),
        where_clause: None,
    };

    let normalized: Vec<EventRecord> = stream_events(transport, query)
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(normalized.len(), 1);
    let first = normalized.into_iter().next().unwrap();
    assert_eq!(first.insert_id, "fixed-id");
    assert!(!first.properties.contains_key("distinct_id"));

    // Feeding the already-normalized record's fields back through a raw
    // envelope (properties now holding only caller-defined keys, plus the
    // same identity fields re-added) must not change the outcome.
    let mut re_raw_properties = first.properties.clone();
    re_raw_properties.insert("distinct_id".into(), json!(first.distinct_id));
    re_raw_properties.insert("time".into(), json!(first.event_time.timestamp()));
    re_raw_properties.insert("$insert_id".into(), json!(first.insert_id));
    let re_raw = RawEventRecord {
        event: first.event_name.clone(),
        properties: re_raw_properties,
    };

    let re_normalized = EventRecord::from_raw(re_raw).unwrap();
    assert_eq!(re_normalized, first);
}

#[tokio::test]
async fn store_location_memory_and_file_both_open() {
    use analytics_client_runtime::storage::StorageEngine;

    let mem = StorageEngine::open(StoreLocation::Memory);
    assert!(mem.is_ok());

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("store.duckdb");
    let file_store = StorageEngine::open(StoreLocation::File(file_path));
    assert!(file_store.is_ok());
}
