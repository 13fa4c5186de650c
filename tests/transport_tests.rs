//! Integration tests for ApiClient.
//!
//! Uses wiremock for HTTP mocking. Covers header injection, status mapping,
//! timeout/abort handling and the session refresh-and-replay flow.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use visibility_client::session::{AuthState, AuthTokenSet, REFRESH_TOKEN_KEY};
use visibility_client::storage::{KeyValueStore, MemoryStore};
use visibility_client::transport::Method;
use visibility_client::{
    ApiClient, ClientError, Config, RequestConfig, RequestOptions, SessionManager,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    storage: Arc<MemoryStore>,
    session: Arc<SessionManager>,
    api: ApiClient,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let storage = Arc::new(MemoryStore::new());
    let session = Arc::new(SessionManager::new(storage.clone()));

    let mut config = Config::with_base_url(server.uri());
    config.timezone_offset_minutes = Some(-120);
    let api = ApiClient::new(&config, Arc::clone(&session)).expect("failed to create client");

    Harness {
        server,
        storage,
        session,
        api,
    }
}

async fn signed_in() -> Harness {
    let h = harness().await;
    h.session
        .store_tokens(AuthTokenSet::new("access-1", Some("refresh-1".to_string())))
        .await
        .unwrap();
    h
}

fn token_expired() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({"success": false, "error": "Token expired"}))
}

fn refreshed(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": {"access_token": access, "refresh_token": refresh, "expires_in": 3600}
    }))
}

#[tokio::test]
async fn test_attaches_auth_and_timezone_headers() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/brands"))
        .and(header("authorization", "Bearer access-1"))
        .and(header("x-timezone-offset", "-120"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})))
        .expect(1)
        .mount(&h.server)
        .await;

    let value = assert_ok!(h.api.get("/brands").await);
    assert_eq!(value, json!({"success": true, "data": []}));
}

#[tokio::test]
async fn test_attaches_impersonation_header() {
    let h = signed_in().await;
    h.session.impersonate("cust-7").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .and(header("x-impersonate-customer", "cust-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&h.server)
        .await;

    assert_ok!(h.api.get("/dashboard").await);
}

#[tokio::test]
async fn test_missing_token_makes_no_request() {
    let h = harness().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.api.get("/brands").await.unwrap_err();
    assert!(matches!(err, ClientError::Authentication(_)));
}

#[tokio::test]
async fn test_public_request_needs_no_token() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@b.c", "password": "secret123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
        .expect(1)
        .mount(&h.server)
        .await;

    let value = h
        .api
        .request(
            "/auth/login",
            RequestOptions::post(json!({"email": "a@b.c", "password": "secret123"})),
            RequestConfig::public(),
        )
        .await
        .unwrap();
    assert_eq!(value["accepted"], true);
}

#[tokio::test]
async fn test_session_401_refreshes_and_replays_once() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/brands"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(token_expired())
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(refreshed("access-2", "refresh-2"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/brands"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["acme"])))
        .expect(1)
        .mount(&h.server)
        .await;

    let value = h.api.get("/brands").await.unwrap();

    assert_eq!(value, json!(["acme"]));
    assert_eq!(h.session.access_token().await.as_deref(), Some("access-2"));
    assert_eq!(h.storage.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_second_401_after_refresh_signs_out() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/brands"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "jwt expired"})),
        )
        .expect(2)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refreshed("access-2", "refresh-2"))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.api.get("/brands").await.unwrap_err();

    assert_eq!(err, ClientError::SessionExpired("jwt expired".to_string()));
    assert!(!h.session.has_tokens().await);
    assert_eq!(h.session.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_refresh_failure_clears_tokens() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/brands"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Session expired"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Refresh token revoked"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.api.get("/brands").await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired(_)));
    assert!(err.is_auth());
    assert!(h.session.access_token().await.is_none());
}

#[tokio::test]
async fn test_non_session_401_keeps_tokens() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/brands/b1/analyze"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "Upstream provider rejected the API key"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refreshed("never", "never"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.api.get("/brands/b1/analyze").await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(!err.is_auth());
    assert_eq!(h.session.access_token().await.as_deref(), Some("access-1"));
}

#[tokio::test]
async fn test_structured_code_counts_as_session_error() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/topics"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "Nope", "code": "TOKEN_EXPIRED"})),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.api.get("/topics").await.unwrap_err();
    assert_eq!(err, ClientError::SessionExpired("Nope".to_string()));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/prompts"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(token_expired())
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refreshed("access-2", "refresh-2").set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prompts"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompts": []})))
        .mount(&h.server)
        .await;

    let calls = (0..5).map(|_| h.api.get("/prompts"));
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), json!({"prompts": []}));
    }
}

#[tokio::test]
async fn test_http_error_uses_body_message() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/brands/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"success": false, "error": "Brand not found"})),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&h.server)
        .await;

    assert_eq!(
        h.api.get("/brands/missing").await.unwrap_err(),
        ClientError::Http {
            status: 404,
            message: "Brand not found".to_string()
        }
    );
    assert_eq!(
        h.api.get("/reports").await.unwrap_err(),
        ClientError::Http {
            status: 500,
            message: "Request failed with status 500".to_string()
        }
    );
}

#[tokio::test]
async fn test_non_json_success_is_empty_object() {
    let h = signed_in().await;

    Mock::given(method("POST"))
        .and(path("/brands/b1/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
        .mount(&h.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/brands/b1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&h.server)
        .await;

    let exported = h
        .api
        .request(
            "/brands/b1/export",
            RequestOptions::post(json!({})),
            RequestConfig::default(),
        )
        .await
        .unwrap();
    assert_eq!(exported, json!({}));

    let deleted = h
        .api
        .request(
            "/brands/b1",
            RequestOptions::with_method(Method::DELETE),
            RequestConfig::default(),
        )
        .await
        .unwrap();
    assert_eq!(deleted, json!({}));
}

#[tokio::test]
async fn test_timeout_reports_duration() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&h.server)
        .await;

    let err = h
        .api
        .request(
            "/dashboard",
            RequestOptions::get(),
            RequestConfig::default().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ClientError::Timeout {
            after: Duration::from_millis(100)
        }
    );
}

#[tokio::test]
async fn test_caller_abort_mid_flight() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&h.server)
        .await;

    let signal = CancellationToken::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = h
        .api
        .request(
            "/dashboard",
            RequestOptions::get().with_signal(signal),
            RequestConfig::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_abort());
}

#[tokio::test]
async fn test_already_aborted_makes_no_request() {
    let h = signed_in().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let signal = CancellationToken::new();
    signal.cancel();

    let err = h
        .api
        .request(
            "/dashboard",
            RequestOptions::get().with_signal(signal),
            RequestConfig::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::Aborted);
}

#[tokio::test]
async fn test_already_aborted_skips_proactive_refresh() {
    let h = harness().await;
    h.session
        .store_tokens(AuthTokenSet {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(1),
        })
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refreshed("access-2", "refresh-2"))
        .expect(0)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let signal = CancellationToken::new();
    signal.cancel();

    let err = h
        .api
        .request(
            "/dashboard",
            RequestOptions::get().with_signal(signal),
            RequestConfig::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::Aborted);
    assert_eq!(h.session.access_token().await.as_deref(), Some("access-1"));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let session = Arc::new(SessionManager::new(Arc::new(MemoryStore::new())));
    let api = ApiClient::new(&Config::with_base_url("http://127.0.0.1:1/api"), session).unwrap();

    let err = api
        .request("/health", RequestOptions::get(), RequestConfig::public())
        .await
        .unwrap_err();

    match err {
        ClientError::Network(message) => assert!(message.contains("Unable to reach the API")),
        other => panic!("expected network error, got {other:?}"),
    }
}
