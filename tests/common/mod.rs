//! Shared scaffolding for the integration tests: a throwaway `Workspace`
//! pointed at a local `wiremock` server instead of the real Provider.

use analytics_client_runtime::{Credentials, StoreLocation, TransportConfig, Workspace};

/// Credentials are never validated client-side; any non-empty strings do.
pub fn test_credentials() -> Credentials {
    Credentials::new("test-account", "test-secret", 1)
}

/// Builds a `Workspace` whose `Transport` sends every request (query and
/// export alike) to `mock_uri`, backed by an in-memory store.
pub fn workspace_against(mock_uri: &str, store: StoreLocation) -> Workspace {
    // A mock server has no Retry-After etiquette and the retry loop's
    // default backoff would make a 429-exhaustion test take minutes, so
    // tests that exercise retries use a short initial backoff.
    let transport_config = TransportConfig {
        max_retries: 3,
        initial_backoff: std::time::Duration::from_millis(5),
        query_base_url: Some(mock_uri.to_string()),
        export_base_url: Some(mock_uri.to_string()),
        ..TransportConfig::default()
    };

    Workspace::builder()
        .credentials(test_credentials())
        .store(store)
        .transport_config(transport_config)
        .build()
        .expect("workspace against mock server should build")
}

/// One-time `tracing` subscriber init, mirroring the teacher's own
/// `tests/` convention of installing a local subscriber rather than
/// relying on the library to do it.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
