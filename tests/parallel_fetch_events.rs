//! Parallel date-sharded event fetch: spec Scenarios C and D, plus the
//! row-count, retry-bound, append/union, and slice-isolation invariants
//! from spec.md §8.

mod common;

use analytics_client_runtime::fetch_support::AppendMode;
use analytics_client_runtime::storage::StoreLocation;
use analytics_client_runtime::workspace::FetchOptions;
use analytics_client_runtime::FetchOutcome;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ndjson_of(count: usize, day_str: &str) -> String {
    let base_time = NaiveDate::parse_from_str(day_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp();
    (0..count)
        .map(|i| {
            json!({
                "event": "pageview",
                "properties": {
                    "distinct_id": format!("user-{i}"),
                    "time": base_time + i as i64,
                    "$insert_id": format!("{day_str}-{i}"),
                }
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn mount_day(mock_server: &MockServer, day_str: &'static str, rows: usize) {
    Mock::given(method("GET"))
        .and(path("/export"))
        .and(query_param("from_date", day_str))
        .and(query_param("to_date", day_str))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson_of(rows, day_str)))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn scenario_c_parallel_fetch_clean() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    for day_str in ["2026-01-01", "2026-01-02", "2026-01-03", "2026-01-04", "2026-01-05"] {
        mount_day(&mock_server, day_str, 1000).await;
    }

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);

    let progress_events = Arc::new(Mutex::new(Vec::new()));
    let collected = Arc::clone(&progress_events);
    let progress: analytics_client_runtime::ProgressCallback =
        Arc::new(move |event| collected.lock().unwrap().push(event));

    let outcome = workspace
        .fetch_events(
            "events_clean",
            day(2026, 1, 1),
            day(2026, 1, 5),
            Vec::new(),
            None,
            AppendMode::Create,
            FetchOptions {
                parallel: true,
                workers: Some(3),
                progress: Some(progress),
            },
        )
        .await
        .unwrap();

    let FetchOutcome::Parallel(result) = outcome else {
        panic!("expected a parallel outcome");
    };
    assert_eq!(result.total_rows, 5000);
    assert_eq!(result.successful_slices, 5);
    assert_eq!(result.failed_slices, 0);
    assert_eq!(progress_events.lock().unwrap().len(), 5);

    // Invariant 10: stored row count matches the reported row count.
    let counted = workspace
        .sql_scalar("SELECT COUNT(*) FROM events_clean")
        .unwrap();
    assert_eq!(counted, json!(5000));
}

#[tokio::test]
async fn scenario_d_one_slice_rate_limited_exhausted() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    for day_str in ["2026-01-01", "2026-01-02", "2026-01-04", "2026-01-05"] {
        mount_day(&mock_server, day_str, 1000).await;
    }
    // Every attempt against 2026-01-03 is rate-limited; with max_retries=3
    // (see common::workspace_against) the slice is exhausted and fails.
    Mock::given(method("GET"))
        .and(path("/export"))
        .and(query_param("from_date", "2026-01-03"))
        .and(query_param("to_date", "2026-01-03"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .mount(&mock_server)
        .await;

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);

    let progress_events = Arc::new(Mutex::new(Vec::new()));
    let collected = Arc::clone(&progress_events);
    let progress: analytics_client_runtime::ProgressCallback =
        Arc::new(move |event| collected.lock().unwrap().push(event));

    let outcome = workspace
        .fetch_events(
            "events_one_bad",
            day(2026, 1, 1),
            day(2026, 1, 5),
            Vec::new(),
            None,
            AppendMode::Create,
            FetchOptions {
                parallel: true,
                workers: Some(3),
                progress: Some(progress),
            },
        )
        .await
        .unwrap();

    let FetchOutcome::Parallel(result) = outcome else {
        panic!("expected a parallel outcome");
    };
    assert_eq!(result.total_rows, 4000);
    assert_eq!(result.successful_slices, 4);
    assert_eq!(result.failed_slices, 1);
    assert_eq!(result.failed_slice_keys, vec!["2026-01-03".to_string()]);

    // Invariant 1.
    assert_eq!(result.successful_slices + result.failed_slices, 5);
    assert_eq!(result.failed_slice_keys.len(), result.failed_slices);

    let failure_event = progress_events
        .lock()
        .unwrap()
        .iter()
        .find(|e| !e.success)
        .cloned()
        .unwrap();
    assert!(failure_event
        .error
        .as_ref()
        .unwrap()
        .to_lowercase()
        .contains("rate"));

    // Invariant 13: the other four days' rows are all present.
    let counted = workspace
        .sql_scalar("SELECT COUNT(*) FROM events_one_bad")
        .unwrap();
    assert_eq!(counted, json!(4000));
}

#[tokio::test]
async fn slice_failure_isolation_on_server_error() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    for day_str in ["2026-01-01", "2026-01-02", "2026-01-03"] {
        mount_day(&mock_server, day_str, 10).await;
    }
    // 2026-01-02 returns 500 on every attempt.
    Mock::given(method("GET"))
        .and(path("/export"))
        .and(query_param("from_date", "2026-01-02"))
        .and(query_param("to_date", "2026-01-02"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);

    let outcome = workspace
        .fetch_events(
            "isolated",
            day(2026, 1, 1),
            day(2026, 1, 3),
            Vec::new(),
            None,
            AppendMode::Create,
            FetchOptions {
                parallel: true,
                workers: Some(2),
                progress: None,
            },
        )
        .await
        .unwrap();

    let FetchOutcome::Parallel(result) = outcome else {
        panic!("expected a parallel outcome");
    };
    assert_eq!(result.failed_slices, 1);
    assert_eq!(result.failed_slice_keys, vec!["2026-01-02".to_string()]);
    assert_eq!(result.total_rows, 20);
}

#[tokio::test]
async fn append_over_disjoint_date_range_unions_metadata() {
    common::init_tracing();
    let mock_server = MockServer::start().await;
    mount_day(&mock_server, "2026-01-01", 5).await;
    mount_day(&mock_server, "2026-01-10", 7).await;

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);

    let first = workspace
        .fetch_events(
            "appended",
            day(2026, 1, 1),
            day(2026, 1, 1),
            Vec::new(),
            None,
            AppendMode::Create,
            FetchOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(first.row_count(), 5);

    let second = workspace
        .fetch_events(
            "appended",
            day(2026, 1, 10),
            day(2026, 1, 10),
            Vec::new(),
            None,
            AppendMode::Append,
            FetchOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(second.row_count(), 7);

    let metadata = workspace.table_metadata("appended").unwrap().unwrap();
    assert_eq!(metadata.row_count, 12);
    assert_eq!(
        metadata.date_range,
        Some((day(2026, 1, 1), day(2026, 1, 10)))
    );
}

#[tokio::test]
async fn empty_date_range_yields_empty_table_without_error() {
    common::init_tracing();
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&mock_server)
        .await;

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);
    let outcome = workspace
        .fetch_events(
            "empty_range",
            day(2026, 2, 1),
            day(2026, 2, 1),
            Vec::new(),
            None,
            AppendMode::Create,
            FetchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.row_count(), 0);
    let counted = workspace
        .sql_scalar("SELECT COUNT(*) FROM empty_range")
        .unwrap();
    assert_eq!(counted, json!(0));
}

#[tokio::test]
async fn row_sets_agree_across_worker_counts() {
    common::init_tracing();
    let mock_server = MockServer::start().await;
    for day_str in ["2026-03-01", "2026-03-02", "2026-03-03"] {
        mount_day(&mock_server, day_str, 20).await;
    }

    for workers in [1, 3, 5] {
        let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);
        let table = format!("w{workers}");
        let outcome = workspace
            .fetch_events(
                &table,
                day(2026, 3, 1),
                day(2026, 3, 3),
                Vec::new(),
                None,
                AppendMode::Create,
                FetchOptions {
                    parallel: true,
                    workers: Some(workers),
                    progress: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.row_count(), 60);
    }
}

#[tokio::test]
async fn events_filter_applies_to_every_day_not_just_the_probe() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    for day_str in ["2026-01-01", "2026-01-02", "2026-01-03"] {
        Mock::given(method("GET"))
            .and(path("/export"))
            .and(query_param("from_date", day_str))
            .and(query_param("to_date", day_str))
            .and(query_param("event", "[\"signup\"]"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson_of(10, day_str)))
            .mount(&mock_server)
            .await;
    }

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);
    let outcome = workspace
        .fetch_events(
            "filtered",
            day(2026, 1, 1),
            day(2026, 1, 3),
            vec!["signup".to_string()],
            None,
            AppendMode::Create,
            FetchOptions {
                parallel: true,
                workers: Some(3),
                progress: None,
            },
        )
        .await
        .unwrap();

    // If the filter were dropped for days 2 and 3 (as it once was), those
    // requests would miss the `event` query-param matcher above and the
    // mock server would 404 them, surfacing as failed slices.
    let FetchOutcome::Parallel(result) = outcome else {
        panic!("expected a parallel outcome");
    };
    assert_eq!(result.failed_slices, 0);
    assert_eq!(result.successful_slices, 3);
    assert_eq!(result.total_rows, 30);
}

#[tokio::test]
async fn retries_are_bounded_by_max_retries() {
    common::init_tracing();
    let mock_server = MockServer::start().await;
    // Always 503; the transport must give up after its configured cap
    // (3, per common::workspace_against) rather than retrying forever.
    let scoped = Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount_as_scoped(&mock_server)
        .await;

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);
    let result = workspace
        .fetch_events(
            "never_succeeds",
            day(2026, 1, 1),
            day(2026, 1, 1),
            Vec::new(),
            None,
            AppendMode::Create,
            FetchOptions::default(),
        )
        .await;

    assert!(result.is_err());
    drop(scoped);
}
