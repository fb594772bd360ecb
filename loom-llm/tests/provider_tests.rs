//! Provider dispatch tests against an in-process mock upstream
//!
//! Verifies URL shape, auth headers, body-shape classification and
//! verbatim non-2xx passthrough for both provider dialects.

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use loom_llm::{AzureProvider, ChatProvider, OpenAiProvider, ProxyBody, ProxyRequest, UpstreamError};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// What the mock upstream observed about the last request.
#[derive(Debug, Default, Clone)]
struct Observed {
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    api_key: Option<String>,
    content_type: Option<String>,
    body: Value,
}

type Shared = Arc<Mutex<Option<Observed>>>;

async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock upstream serve");
    });
    addr
}

fn observe(observed: &Shared, uri: &Uri, query: Option<String>, headers: &HeaderMap, body: &Value) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    *observed.lock().expect("observed lock") = Some(Observed {
        path: uri.path().to_string(),
        query,
        authorization: header("authorization"),
        api_key: header("api-key"),
        content_type: header("content-type"),
        body: body.clone(),
    });
}

fn json_upstream(observed: Shared, status: StatusCode, response: Value) -> Router {
    let handler = move |State((observed, status, response)): State<(Shared, StatusCode, Value)>,
                        uri: Uri,
                        RawQuery(query): RawQuery,
                        headers: HeaderMap,
                        Json(body): Json<Value>| async move {
        observe(&observed, &uri, query, &headers, &body);
        (status, Json(response)).into_response()
    };
    Router::new()
        .route("/v1/chat/completions", post(handler.clone()))
        .route("/openai/deployments/:dep/chat/completions", post(handler))
        .with_state((observed, status, response))
}

fn taken(observed: &Shared) -> Observed {
    observed
        .lock()
        .expect("observed lock")
        .clone()
        .expect("upstream was called")
}

#[tokio::test]
async fn test_openai_url_and_bearer_header() {
    let observed: Shared = Arc::new(Mutex::new(None));
    let upstream = json_upstream(
        observed.clone(),
        StatusCode::OK,
        json!({"choices": [{"message": {"content": "pong"}}]}),
    );
    let addr = spawn_upstream(upstream).await;

    let provider = OpenAiProvider::new(
        reqwest::Client::new(),
        "sk-test",
        Some(&format!("http://{addr}")),
    )
    .expect("provider");

    let response = provider
        .proxy(ProxyRequest::new(json!({"model": "gpt-4o", "messages": []})))
        .await
        .expect("proxy");
    assert_eq!(response.status, 200);

    let seen = taken(&observed);
    assert_eq!(seen.path, "/v1/chat/completions");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen.api_key, None);
    assert_eq!(seen.content_type.as_deref(), Some("application/json"));
    assert_eq!(seen.body["model"], "gpt-4o");

    let ProxyBody::Json(value) = response.body else {
        panic!("expected JSON body");
    };
    assert_eq!(value["choices"][0]["message"]["content"], "pong");
}

#[tokio::test]
async fn test_azure_url_and_api_key_header() {
    let observed: Shared = Arc::new(Mutex::new(None));
    let upstream = json_upstream(observed.clone(), StatusCode::OK, json!({"ok": true}));
    let addr = spawn_upstream(upstream).await;

    let provider = AzureProvider::new(
        reqwest::Client::new(),
        "azure-key",
        &format!("http://{addr}"),
        "gpt-4o",
        "2024-06-01",
    )
    .expect("provider");

    let response = provider
        .proxy(ProxyRequest::new(json!({"messages": []})))
        .await
        .expect("proxy");
    assert_eq!(response.status, 200);

    let seen = taken(&observed);
    assert_eq!(seen.path, "/openai/deployments/gpt-4o/chat/completions");
    assert_eq!(seen.query.as_deref(), Some("api-version=2024-06-01"));
    assert_eq!(seen.api_key.as_deref(), Some("azure-key"));
    assert_eq!(seen.authorization, None);
}

#[tokio::test]
async fn test_non_2xx_passthrough_preserves_status_and_body() {
    for status in [
        StatusCode::UNAUTHORIZED,
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::INTERNAL_SERVER_ERROR,
    ] {
        let observed: Shared = Arc::new(Mutex::new(None));
        let upstream = json_upstream(
            observed,
            status,
            json!({"error": {"message": "upstream says no"}}),
        );
        let addr = spawn_upstream(upstream).await;

        let provider = OpenAiProvider::new(
            reqwest::Client::new(),
            "sk-test",
            Some(&format!("http://{addr}")),
        )
        .expect("provider");

        let response = provider
            .proxy(ProxyRequest::new(json!({"messages": []})))
            .await
            .expect("non-2xx is not an error");
        assert_eq!(response.status, status.as_u16());
        match response.body {
            ProxyBody::Json(value) => {
                assert_eq!(value["error"]["message"], "upstream says no");
            }
            _ => panic!("expected JSON body"),
        }
    }
}

#[tokio::test]
async fn test_event_stream_returned_unconsumed() {
    const SSE_PAYLOAD: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"HELLO\"}}]}\n\n\
                               data: [DONE]\n\n";

    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .body(Body::from(SSE_PAYLOAD))
                .expect("response")
        }),
    );
    let addr = spawn_upstream(app).await;

    let provider = OpenAiProvider::new(
        reqwest::Client::new(),
        "sk-test",
        Some(&format!("http://{addr}")),
    )
    .expect("provider");

    let response = provider
        .proxy(ProxyRequest::new(json!({"messages": [], "stream": true})))
        .await
        .expect("proxy");
    assert_eq!(response.status, 200);

    let ProxyBody::Stream(mut stream) = response.body else {
        panic!("expected stream body");
    };
    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.expect("chunk"));
    }
    assert_eq!(collected, SSE_PAYLOAD.as_bytes());
}

#[tokio::test]
async fn test_network_failure_is_upstream_unavailable() {
    // Nothing listens on this port.
    let provider = OpenAiProvider::new(
        reqwest::Client::new(),
        "sk-test",
        Some("http://127.0.0.1:9"),
    )
    .expect("provider");

    let err = provider
        .proxy(ProxyRequest::new(json!({"messages": []})))
        .await
        .expect_err("must fail");
    assert!(matches!(err, UpstreamError::Unavailable { .. }));
}
