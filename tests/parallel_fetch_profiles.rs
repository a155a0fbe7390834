//! Parallel page-sharded profile fetch: spec Scenarios E and F, plus the
//! single-page boundary invariant from spec.md §8.

mod common;

use analytics_client_runtime::errors::AnalyticsError;
use analytics_client_runtime::fetch_support::AppendMode;
use analytics_client_runtime::storage::StoreLocation;
use analytics_client_runtime::transport::EngageFilters;
use analytics_client_runtime::workspace::FetchOptions;
use analytics_client_runtime::FetchOutcome;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn profile_page(page: u64, page_size: u64, total: u64, session_id: &str) -> serde_json::Value {
    let start = page * page_size;
    let end = (start + page_size).min(total);
    let results: Vec<serde_json::Value> = (start..end)
        .map(|i| {
            json!({
                "$distinct_id": format!("user-{i}"),
                "$properties": {"$email": format!("user-{i}@example.com")},
            })
        })
        .collect();

    json!({
        "total": total,
        "page_size": page_size,
        "session_id": session_id,
        "page": page,
        "results": results,
    })
}

#[tokio::test]
async fn scenario_e_profile_fetch_paging() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    for page in 0..3u64 {
        let body = profile_page(page, 1000, 2500, "S");
        Mock::given(method("POST"))
            .and(path("/query/engage"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&mock_server)
            .await;
    }

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);
    let outcome = workspace
        .fetch_profiles(
            "profiles_paged",
            EngageFilters::default(),
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
    assert_eq!(result.total_rows, 2500);
    assert_eq!(result.successful_slices, 3);
    assert_eq!(result.failed_slices, 0);

    let counted = workspace
        .sql_scalar("SELECT COUNT(*) FROM profiles_paged")
        .unwrap();
    assert_eq!(counted, json!(2500));
}

#[tokio::test]
async fn single_page_profile_fetch_schedules_no_extra_pages() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    let body = profile_page(0, 1000, 400, "S");
    let scoped = Mock::given(method("POST"))
        .and(path("/query/engage"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount_as_scoped(&mock_server)
        .await;

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);
    let outcome = workspace
        .fetch_profiles(
            "profiles_single_page",
            EngageFilters::default(),
            AppendMode::Create,
            FetchOptions {
                parallel: true,
                workers: None,
                progress: None,
            },
        )
        .await
        .unwrap();

    let FetchOutcome::Parallel(result) = outcome else {
        panic!("expected a parallel outcome");
    };
    assert_eq!(result.successful_slices, 1);
    assert_eq!(result.total_rows, 400);
    drop(scoped);
}

#[tokio::test]
async fn scenario_f_auth_failure_on_page_zero_fails_fast() {
    common::init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query/engage"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&mock_server)
        .await;

    let workspace = common::workspace_against(&mock_server.uri(), StoreLocation::Memory);
    let err = workspace
        .fetch_profiles(
            "profiles_never_created",
            EngageFilters::default(),
            AppendMode::Create,
            FetchOptions {
                parallel: true,
                workers: None,
                progress: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyticsError::Authentication(_)));
    assert!(workspace.table_metadata("profiles_never_created").unwrap().is_none());

    // No retry should have been attempted for an authentication failure.
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}
