//! HTTP transport tests against a mock datastore endpoint
//!
//! Covers request shape (query parameters, bearer token), status mapping
//! and a full paginated fetch through [`FetchClient`].

use serde_json::{json, Value};
use sgcol_common::ResourceId;
use sgcol_pipeline::api::{FetchClient, FetchStop, HttpTransport, PageTransport};
use sgcol_pipeline::clock::TokioSleeper;
use sgcol_pipeline::config::FetchPolicy;
use sgcol_pipeline::FetchError;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const SEARCH_PATH: &str = "/api/action/datastore_search";
const RESOURCE: &str = "d_8b84c4ee58e3cfc0ece0d773c8ca6abc";

fn endpoint(server: &MockServer) -> String {
    format!("{}{}", server.uri(), SEARCH_PATH)
}

fn resource() -> ResourceId {
    ResourceId::new(RESOURCE).expect("valid resource id")
}

fn transport(server: &MockServer, api_key: Option<&str>) -> HttpTransport {
    HttpTransport::new(
        endpoint(server),
        api_key.map(str::to_string),
        Duration::from_secs(5),
    )
    .expect("Failed to build transport")
}

/// A datastore response with `_id`s from `ids`
fn search_response(ids: std::ops::Range<u64>, total: u64) -> Value {
    let records: Vec<Value> = ids
        .map(|id| json!({ "_id": id, "month": "2024-01", "town": "BEDOK" }))
        .collect();

    json!({
        "help": "https://data.gov.sg/api/3/action/help_show?name=datastore_search",
        "success": true,
        "result": {
            "resource_id": RESOURCE,
            "records": records,
            "total": total
        }
    })
}

/// Zero waits so the end-to-end fetch runs instantly
fn instant_policy(page_size: u32) -> FetchPolicy {
    FetchPolicy {
        page_size,
        inter_request_delay: Duration::ZERO,
        cooldown: Duration::ZERO,
        backoff_base: Duration::ZERO,
        timeout_delay: Duration::ZERO,
        ..FetchPolicy::default()
    }
}

#[tokio::test]
async fn test_page_request_carries_paging_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("resource_id", RESOURCE))
        .and(query_param("offset", "4000"))
        .and(query_param("limit", "2000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_response(4000..4003, 4003)))
        .expect(1)
        .mount(&server)
        .await;

    let page = transport(&server, None)
        .fetch_page(&resource(), 4000, 2000)
        .await
        .expect("page should parse");

    assert_eq!(page.total, 4003);
    assert_eq!(page.records.len(), 3);
    assert_eq!(page.records[0]["_id"], 4000);
}

#[tokio::test]
async fn test_api_key_sent_as_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_response(0..1, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let page = transport(&server, Some("test-key"))
        .fetch_page(&resource(), 0, 10)
        .await
        .expect("authorized request should succeed");

    assert_eq!(page.records.len(), 1);
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = transport(&server, None)
        .fetch_page(&resource(), 0, 10)
        .await
        .unwrap_err();

    assert_eq!(err, FetchError::RateLimited);
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = transport(&server, None)
        .fetch_page(&resource(), 0, 10)
        .await
        .unwrap_err();

    match err {
        FetchError::Transport(message) => assert!(message.contains("500")),
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_success_false_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": { "message": "Resource not found" }
        })))
        .mount(&server)
        .await;

    let err = transport(&server, None)
        .fetch_page(&resource(), 0, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = transport(&server, None)
        .fetch_page(&resource(), 0, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_response(0..1, 1))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(endpoint(&server), None, Duration::from_millis(200))
        .expect("Failed to build transport");
    let err = transport.fetch_page(&resource(), 0, 10).await.unwrap_err();

    assert!(matches!(err, FetchError::Timeout(_)));
}

#[tokio::test]
async fn test_fetch_all_recovers_from_rate_limit() {
    let server = MockServer::start().await;

    // first request for the second page is throttled once
    Mock::given(method("GET"))
        .and(query_param("offset", "3"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    for (offset, ids) in [("0", 0..3), ("3", 3..6), ("6", 6..7)] {
        Mock::given(method("GET"))
            .and(query_param("offset", offset))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_response(ids, 7)))
            .mount(&server)
            .await;
    }

    let client = FetchClient::new(
        Arc::new(transport(&server, None)),
        Arc::new(TokioSleeper),
        instant_policy(3),
    );

    let outcome = client.fetch_all(&resource(), "HDB Resale").await;

    assert_eq!(outcome.stop, FetchStop::Completed);
    let ids: Vec<u64> = outcome
        .records
        .iter()
        .map(|r| r["_id"].as_u64().expect("numeric _id"))
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 6]);

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn test_fetch_all_keeps_prefix_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_response(0..3, 9)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("offset", "3"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::new(
        Arc::new(transport(&server, None)),
        Arc::new(TokioSleeper),
        instant_policy(3),
    );

    let outcome = client.fetch_all(&resource(), "COE Results").await;

    assert_eq!(outcome.records.len(), 3);
    assert!(matches!(
        outcome.stop,
        FetchStop::Partial(FetchError::Transport(_))
    ));
}
