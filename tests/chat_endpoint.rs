//! End-to-end tests for the HTTP surface.
//!
//! Drives the full router with `tower::ServiceExt::oneshot` against
//! wiremock upstreams, covering:
//! - Streaming success with the provider marker and headers
//! - 429 with per-attempt details once every credential fails
//! - 500 without network traffic when no credential exists
//! - Mode filtering and user-supplied keys
//! - 400 and 405 on malformed input

use axum::body::Body;
use http::{Request, StatusCode};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_relay::config::{ApiFormat, ApiKey, Config, EnvSnapshot, ProviderConfig, RelayConfig};
use chat_relay::relay::{
    create_router, AppState, RELAY_ATTEMPTS_HEADER, RELAY_PROVIDER_HEADER,
    RELAY_REQUEST_ID_HEADER,
};

const SSE_HI_THERE: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
    "data: [DONE]\n\n",
);

const CHAT_BODY: &str = r#"{"messages":[{"role":"user","content":"hello"}]}"#;

fn openai_provider(name: &str, server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        format: ApiFormat::Openai,
        endpoint: format!("{}/v1/chat/completions", server.uri()),
        model: "test-model".to_string(),
        key_prefix: None,
        api_keys: Vec::new(),
        env_scan: true,
    }
}

fn gemini_provider(name: &str, server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        format: ApiFormat::Gemini,
        endpoint: format!(
            "{}/v1beta/models/{{model}}:streamGenerateContent",
            server.uri()
        ),
        model: "gem-model".to_string(),
        key_prefix: Some("AIza".to_string()),
        api_keys: Vec::new(),
        env_scan: true,
    }
}

fn app(providers: Vec<ProviderConfig>, env: EnvSnapshot) -> axum::Router {
    let config = Config {
        providers,
        relay: RelayConfig {
            attempt_timeout_ms: 2_000,
            ..RelayConfig::default()
        },
        ..Config::default()
    };
    create_router(AppState::new(config, env, reqwest::Client::new()))
}

fn post_chat(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

#[tokio::test]
async fn streams_first_working_provider_with_marker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer limited"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer working"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_HI_THERE, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let env: EnvSnapshot = [
        ("MOCK_API_KEY", "limited"),
        ("MOCK_API_KEY_2", "working"),
    ]
    .into_iter()
    .collect();

    let response = app(vec![openai_provider("mock", &server)], env)
        .oneshot(post_chat(CHAT_BODY))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
    assert_eq!(response.headers().get(RELAY_PROVIDER_HEADER).unwrap(), "mock");
    assert!(response.headers().get(RELAY_REQUEST_ID_HEADER).is_some());
    assert_eq!(body_string(response).await, "[provider:mock]Hi there");
}

#[tokio::test]
async fn every_credential_failing_returns_429_with_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .expect(2)
        .mount(&server)
        .await;

    let env: EnvSnapshot = [("MOCK_API_KEY", "bad-1"), ("OTHER_MOCK_API_KEY", "bad-2")]
        .into_iter()
        .collect();

    let response = app(vec![openai_provider("mock", &server)], env)
        .oneshot(post_chat(CHAT_BODY))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(RELAY_ATTEMPTS_HEADER).unwrap(), "2/mock");

    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("busy"));
    assert_eq!(
        json["details"],
        serde_json::json!(["mock: HTTP 401: invalid key", "mock: HTTP 401: invalid key"])
    );
}

#[tokio::test]
async fn no_credentials_is_500_without_upstream_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let response = app(vec![openai_provider("mock", &server)], EnvSnapshot::default())
        .oneshot(post_chat(CHAT_BODY))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("credentials"));
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn gemini_mode_only_tries_gemini_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_HI_THERE, "text/event-stream"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gem-model:streamGenerateContent"))
        .and(header("x-goog-api-key", "AIzaConfigured"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"[{"candidates":[{"content":{"parts":[{"text":"from gemini"}]}}]}]"#,
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let env: EnvSnapshot = [("LLAMA_API_KEY", "llama-key"), ("GEM_API_KEY", "AIzaConfigured")]
        .into_iter()
        .collect();

    let body = r#"{"messages":[{"role":"user","content":"hello"}],"selectedMode":"gemini"}"#;
    let response = app(
        vec![openai_provider("llama", &server), gemini_provider("gem", &server)],
        env,
    )
    .oneshot(post_chat(body))
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "[provider:gem]from gemini");
}

#[tokio::test]
async fn user_key_replaces_configured_pool() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer configured"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_HI_THERE, "text/event-stream"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer mine"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_HI_THERE, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut provider = openai_provider("mock", &server);
    provider.api_keys = vec![ApiKey::from("configured")];

    let body = r#"{"messages":[{"role":"user","content":"hello"}],"userApiKey":"  mine  "}"#;
    let response = app(vec![provider], EnvSnapshot::default())
        .oneshot(post_chat(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "[provider:mock]Hi there");
}

#[tokio::test]
async fn failing_user_key_does_not_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer configured"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_HI_THERE, "text/event-stream"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer revoked"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let mut provider = openai_provider("mock", &server);
    provider.api_keys = vec![ApiKey::from("configured")];

    let body = r#"{"messages":[{"role":"user","content":"hello"}],"userApiKey":"revoked"}"#;
    let response = app(vec![provider], EnvSnapshot::default())
        .oneshot(post_chat(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["details"], serde_json::json!(["mock: HTTP 403: forbidden"]));
}

#[tokio::test]
async fn malformed_body_is_400() {
    let server = MockServer::start().await;
    let response = app(vec![openai_provider("mock", &server)], EnvSnapshot::default())
        .oneshot(post_chat("{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("Invalid request"));
}

#[tokio::test]
async fn get_on_chat_route_is_405() {
    let server = MockServer::start().await;
    let request = Request::builder()
        .method("GET")
        .uri("/api/chat")
        .body(Body::empty())
        .unwrap();

    let response = app(vec![openai_provider("mock", &server)], EnvSnapshot::default())
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Method not allowed");
}

#[tokio::test]
async fn health_returns_ok() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app(Vec::new(), EnvSnapshot::default())
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}
