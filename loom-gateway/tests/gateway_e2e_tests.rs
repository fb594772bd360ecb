//! End-to-end gateway scenarios
//!
//! These tests need a running PostgreSQL with the schema from
//! `migrations/schema.sql` applied, reachable via `DATABASE_URL`. Enable
//! with `--features db-tests`. The upstream provider is an in-process
//! mock server.
#![cfg(feature = "db-tests")]

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use loom_gateway::{AppState, AuthConfig, DbClient, DbConfig, GatewayConfig, JwtSecret};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const MASTER_KEY_HEX: &str = "abababababababababababababababababababababababababababababababab";

// ============================================================================
// MOCK UPSTREAM
// ============================================================================

#[derive(Clone)]
struct MockUpstream {
    requests: Arc<Mutex<Vec<Value>>>,
    response: Arc<Value>,
    status: StatusCode,
}

impl MockUpstream {
    fn new(status: StatusCode, response: Value) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response: Arc::new(response),
            status,
        }
    }

    fn captured(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn mock_json_handler(
    State(mock): State<MockUpstream>,
    Json(body): Json<Value>,
) -> Response {
    mock.requests.lock().expect("requests lock").push(body);
    (mock.status, Json(mock.response.as_ref().clone())).into_response()
}

async fn spawn_mock(mock: MockUpstream) -> SocketAddr {
    let app = Router::new()
        .route("/v1/chat/completions", post(mock_json_handler))
        .route(
            "/openai/deployments/:dep/chat/completions",
            post(mock_json_handler),
        )
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock serve");
    });
    addr
}

fn pong_response() -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "pong"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12}
    })
}

// ============================================================================
// HARNESS
// ============================================================================

struct Harness {
    app: Router,
    db: DbClient,
}

async fn harness() -> Harness {
    let db = DbClient::from_config(&DbConfig::from_env()).expect("db client");
    let config = GatewayConfig {
        encryption_master_key: Some(MASTER_KEY_HEX.to_string()),
        openai_api_key: Some("sk-env-fallback".to_string()),
        trace_flush_interval: Duration::from_millis(50),
        ..GatewayConfig::default()
    };
    let auth = AuthConfig {
        portal_secret: JwtSecret::new("e2e-portal-secret-with-enough-length"),
        admin_secret: None,
        token_expiry_secs: 3600,
    };
    let (state, _drainer) = AppState::build(db.clone(), config, auth).expect("state");
    Harness {
        app: loom_gateway::create_router(state),
        db,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, value)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Sign up a fresh tenant and return (token, tenant_name, default_agent_id).
async fn signup(app: &Router) -> (String, String, String) {
    let email = format!("{}@example.com", unique("user"));
    let tenant_name = unique("tenant");
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/v1/portal/auth/signup",
            None,
            json!({"email": email, "password": "pw-xyz-123", "tenant_name": tenant_name}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
    let token = body["token"].as_str().expect("token").to_string();

    let (status, agents) = send(app, json_request("GET", "/v1/portal/agents", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let agent_id = agents[0]["agent_id"].as_str().expect("agent id").to_string();
    (token, tenant_name, agent_id)
}

async fn set_openai_provider(app: &Router, token: &str, mock: SocketAddr, extra: Value) {
    let mut overrides = json!({
        "provider_config": {
            "provider": "openai",
            "api_key": "sk-tenant",
            "base_url": format!("http://{mock}")
        }
    });
    if let (Some(target), Some(source)) = (overrides.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    let (status, body) = send(
        app,
        json_request("PATCH", "/v1/portal/tenant", Some(token), overrides),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "tenant update failed: {body}");
}

async fn create_api_key(app: &Router, token: &str, agent_id: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            &format!("/v1/portal/agents/{agent_id}/keys"),
            Some(token),
            json!({"name": "e2e"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "key creation failed: {body}");
    body["key"].as_str().expect("raw key").to_string()
}

async fn trace_count(app: &Router, token: &str) -> usize {
    let (status, body) = send(
        app,
        json_request("GET", "/v1/portal/traces", Some(token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["traces"].as_array().expect("traces").len()
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// S1: signup creates user, tenant and a Default agent; login issues a
/// fresh valid token.
#[tokio::test]
async fn s1_signup_and_login() {
    let harness = harness().await;
    let email = format!("{}@example.com", unique("alice"));

    let (status, body) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/portal/auth/signup",
            None,
            json!({"email": email, "password": "pw-xyz-123", "tenant_name": "Acme"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], email);
    assert_eq!(body["tenant"]["name"], "Acme");
    let signup_token = body["token"].as_str().expect("token").to_string();

    let (status, agents) = send(
        &harness.app,
        json_request("GET", "/v1/portal/agents", Some(&signup_token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agents[0]["name"], "Default");

    // iat has second granularity; step past it so the tokens differ.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (status, body) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/portal/auth/login",
            None,
            json!({"email": email, "password": "pw-xyz-123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let login_token = body["token"].as_str().expect("token").to_string();
    assert_ne!(signup_token, login_token);

    let (status, _) = send(
        &harness.app,
        json_request("GET", "/v1/portal/me", Some(&login_token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Wrong password never authenticates
    let (status, _) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/portal/auth/login",
            None,
            json!({"email": email, "password": "wrong-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// S2: plain passthrough with trace token accounting from the upstream
/// usage object.
#[tokio::test]
async fn s2_passthrough_and_trace_tokens() {
    let harness = harness().await;
    let mock = MockUpstream::new(StatusCode::OK, pong_response());
    let mock_addr = spawn_mock(mock.clone()).await;

    let (token, _, agent_id) = signup(&harness.app).await;
    set_openai_provider(&harness.app, &token, mock_addr, json!({})).await;
    let raw_key = create_api_key(&harness.app, &token, &agent_id).await;

    let (status, body) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/chat/completions",
            Some(&raw_key),
            json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "ping"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "pong");
    assert_eq!(body["usage"]["total_tokens"], 12);

    // Trace lands after the drainer flush interval.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let (status, traces) = send(
        &harness.app,
        json_request("GET", "/v1/portal/traces", Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let trace = &traces["traces"][0];
    assert_eq!(trace["prompt_tokens"], 7);
    assert_eq!(trace["completion_tokens"], 5);
    assert_eq!(trace["total_tokens"], 12);
    assert_eq!(trace["status_code"], 200);
    assert_eq!(trace["provider"], "openai");
}

/// S3: prepend system prompt and merged tools reach the upstream body.
#[tokio::test]
async fn s3_prompt_and_skill_merge() {
    let harness = harness().await;
    let mock = MockUpstream::new(StatusCode::OK, pong_response());
    let mock_addr = spawn_mock(mock.clone()).await;

    let (token, _, agent_id) = signup(&harness.app).await;
    set_openai_provider(&harness.app, &token, mock_addr, json!({})).await;
    let (status, _) = send(
        &harness.app,
        json_request(
            "PATCH",
            &format!("/v1/portal/agents/{agent_id}"),
            Some(&token),
            json!({"overrides": {
                "system_prompt": "You are helpful.",
                "skills": [{"name": "get_time"}]
            }}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let raw_key = create_api_key(&harness.app, &token, &agent_id).await;

    let (status, _) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/chat/completions",
            Some(&raw_key),
            json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "ping"}],
                "tools": [{"name": "search"}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let upstream_body = mock.captured().pop().expect("upstream called");
    assert_eq!(
        upstream_body["messages"][0],
        json!({"role": "system", "content": "You are helpful."})
    );
    let tool_names: Vec<&str> = upstream_body["tools"]
        .as_array()
        .expect("tools")
        .iter()
        .filter_map(|t| t.get("name").and_then(Value::as_str))
        .collect();
    assert!(tool_names.contains(&"get_time"));
    assert!(tool_names.contains(&"search"));
}

/// S4: conversations with snapshotting. The third turn crosses the token
/// budget; exactly one snapshot is created and the upstream body starts
/// with the summariser's output followed by the new user message only.
#[tokio::test]
async fn s4_conversation_snapshot() {
    let harness = harness().await;
    let mock = MockUpstream::new(StatusCode::OK, pong_response());
    let mock_addr = spawn_mock(mock.clone()).await;

    let (token, _, agent_id) = signup(&harness.app).await;
    set_openai_provider(&harness.app, &token, mock_addr, json!({})).await;
    let (status, _) = send(
        &harness.app,
        json_request(
            "PATCH",
            &format!("/v1/portal/agents/{agent_id}"),
            Some(&token),
            json!({"conversations_enabled": true, "conversation_token_limit": 100}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let raw_key = create_api_key(&harness.app, &token, &agent_id).await;

    // 240 chars -> 60 estimated tokens per user turn.
    let filler = "x".repeat(240);
    for _ in 0..2 {
        let (status, body) = send(
            &harness.app,
            json_request(
                "POST",
                "/v1/chat/completions",
                Some(&raw_key),
                json!({
                    "model": "gpt-4o",
                    "conversation_id": "c1",
                    "messages": [{"role": "user", "content": filler}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation_id"], "c1");
        // Fire-and-forget persistence; give it time to land.
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    // Third turn: context estimate (2 x 60 + 2 x 5) exceeds 100.
    let (status, body) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/chat/completions",
            Some(&raw_key),
            json!({
                "model": "gpt-4o",
                "conversation_id": "c1",
                "messages": [{"role": "user", "content": "and now?"}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversation_id"], "c1");

    // The mock saw: 2 first-turn calls, then the summariser call, then the
    // third main call.
    let captured = mock.captured();
    let main_call = captured.last().expect("main call captured");
    let messages = main_call["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 2, "snapshot summary + new user turn only");
    assert_eq!(messages[0]["role"], "system");
    // The summariser's output is the mock's canned content.
    assert_eq!(messages[0]["content"], "pong");
    assert_eq!(messages[1], json!({"role": "user", "content": "and now?"}));

    // Exactly one snapshot row exists for this agent's conversation.
    let conn = harness.db.get_conn().await.expect("conn");
    let row = conn
        .query_one(
            "SELECT count(*) FROM conversation_snapshots s \
             JOIN conversations c ON c.conversation_id = s.conversation_id \
             WHERE c.external_id = 'c1' AND c.agent_id = $1",
            &[&uuid::Uuid::parse_str(&agent_id).expect("agent uuid")],
        )
        .await
        .expect("snapshot count");
    let snapshots: i64 = row.get(0);
    assert_eq!(snapshots, 1);
}

/// S5: Azure-configured tenant hits the deployment-shaped URL with the
/// api-key header.
#[tokio::test]
async fn s5_azure_dialect() {
    let harness = harness().await;
    let mock = MockUpstream::new(StatusCode::OK, pong_response());
    let mock_addr = spawn_mock(mock.clone()).await;

    let (token, _, agent_id) = signup(&harness.app).await;
    let (status, body) = send(
        &harness.app,
        json_request(
            "PATCH",
            "/v1/portal/tenant",
            Some(&token),
            json!({"provider_config": {
                "provider": "azure",
                "api_key": "azure-key",
                "base_url": format!("http://{mock_addr}"),
                "deployment": "gpt-4o-dep",
                "api_version": "2024-06-01"
            }}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "tenant update failed: {body}");
    let raw_key = create_api_key(&harness.app, &token, &agent_id).await;

    let (status, _) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/chat/completions",
            Some(&raw_key),
            json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "ping"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mock.captured().len(), 1, "azure deployment route was hit");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let (_, traces) = send(
        &harness.app,
        json_request("GET", "/v1/portal/traces", Some(&token), json!({})),
    )
    .await;
    assert_eq!(traces["traces"][0]["provider"], "azure");
}

/// S6: a revoked key returns 401 with the OpenAI-style error type and
/// produces no trace row.
#[tokio::test]
async fn s6_revoked_key_never_authenticates() {
    let harness = harness().await;
    let mock = MockUpstream::new(StatusCode::OK, pong_response());
    let mock_addr = spawn_mock(mock).await;

    let (token, _, agent_id) = signup(&harness.app).await;
    set_openai_provider(&harness.app, &token, mock_addr, json!({})).await;
    let raw_key = create_api_key(&harness.app, &token, &agent_id).await;

    // Find the key id to revoke it.
    let (_, keys) = send(
        &harness.app,
        json_request("GET", "/v1/portal/keys", Some(&token), json!({})),
    )
    .await;
    let key_id = keys[0]["api_key_id"].as_str().expect("key id").to_string();
    let (status, _) = send(
        &harness.app,
        json_request("DELETE", &format!("/v1/portal/keys/{key_id}"), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let before = trace_count(&harness.app, &token).await;
    let (status, body) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/chat/completions",
            Some(&raw_key),
            json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "ping"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "invalid_request_error");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(trace_count(&harness.app, &token).await, before);
}

/// Upstream non-2xx statuses pass through verbatim and are recorded.
#[tokio::test]
async fn upstream_status_passthrough() {
    let harness = harness().await;
    let mock = MockUpstream::new(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"message": "rate limited", "type": "rate_limit_error"}}),
    );
    let mock_addr = spawn_mock(mock).await;

    let (token, _, agent_id) = signup(&harness.app).await;
    set_openai_provider(&harness.app, &token, mock_addr, json!({})).await;
    let raw_key = create_api_key(&harness.app, &token, &agent_id).await;

    let (status, body) = send(
        &harness.app,
        json_request(
            "POST",
            "/v1/chat/completions",
            Some(&raw_key),
            json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "ping"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["message"], "rate limited");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let (_, traces) = send(
        &harness.app,
        json_request("GET", "/v1/portal/traces", Some(&token), json!({})),
    )
    .await;
    assert_eq!(traces["traces"][0]["status_code"], 429);
}

/// Concurrent materialisation of the same external id yields one entity.
#[tokio::test]
async fn idempotent_conversation_materialisation() {
    let harness = harness().await;
    let (token, _, _) = signup(&harness.app).await;
    let (_, me) = send(
        &harness.app,
        json_request("GET", "/v1/portal/me", Some(&token), json!({})),
    )
    .await;
    let tenant_id: loom_core::TenantId = me["tenants"][0]["tenant_id"]
        .as_str()
        .expect("tenant id")
        .parse()
        .expect("tenant uuid");

    let external = unique("conv");
    let (a, b) = tokio::join!(
        harness
            .db
            .conversation_get_or_create(tenant_id, &external, None, None),
        harness
            .db
            .conversation_get_or_create(tenant_id, &external, None, None),
    );
    let a = a.expect("first materialisation");
    let b = b.expect("second materialisation");
    assert_eq!(a.conversation_id, b.conversation_id);
}

/// Concurrent snapshot attempts for one conversation collapse to a single
/// snapshot row.
#[tokio::test]
async fn concurrent_snapshots_collapse() {
    let harness = harness().await;
    let (token, _, _) = signup(&harness.app).await;
    let (_, me) = send(
        &harness.app,
        json_request("GET", "/v1/portal/me", Some(&token), json!({})),
    )
    .await;
    let tenant_id: loom_core::TenantId = me["tenants"][0]["tenant_id"]
        .as_str()
        .expect("tenant id")
        .parse()
        .expect("tenant uuid");

    let conversation = harness
        .db
        .conversation_get_or_create(tenant_id, &unique("conv"), None, None)
        .await
        .expect("conversation");
    let blob = loom_core::EncryptedBlob {
        ciphertext: vec![1, 2, 3],
        iv: vec![0; 12],
    };

    let (a, b) = tokio::join!(
        harness
            .db
            .snapshot_create_guarded(conversation.conversation_id, None, &blob, 2),
        harness
            .db
            .snapshot_create_guarded(conversation.conversation_id, None, &blob, 2),
    );
    let created = [a.expect("first attempt"), b.expect("second attempt")];
    let landed = created.iter().filter(|s| s.is_some()).count();
    assert_eq!(landed, 1, "exactly one concurrent snapshot wins");
}

/// Two concurrent demotions against a two-owner tenant serialise inside
/// the db layer: exactly one succeeds and the tenant keeps an owner.
#[tokio::test]
async fn concurrent_demotions_keep_an_owner() {
    let harness = harness().await;
    let tenant = harness
        .db
        .tenant_create(&unique("tenant"), None)
        .await
        .expect("tenant");
    let alice = harness
        .db
        .user_create(&format!("{}@example.com", unique("alice")), "salt:hash")
        .await
        .expect("alice");
    let bob = harness
        .db
        .user_create(&format!("{}@example.com", unique("bob")), "salt:hash")
        .await
        .expect("bob");
    harness
        .db
        .membership_create(alice.user_id, tenant.tenant_id, loom_core::TenantRole::Owner)
        .await
        .expect("alice owner");
    harness
        .db
        .membership_create(bob.user_id, tenant.tenant_id, loom_core::TenantRole::Owner)
        .await
        .expect("bob owner");

    // Each request demotes a different owner; unguarded, both would pass
    // an owner-count pre-check and leave zero owners.
    let (a, b) = tokio::join!(
        harness.db.membership_update_role(
            tenant.tenant_id,
            alice.user_id,
            loom_core::TenantRole::Member
        ),
        harness.db.membership_update_role(
            tenant.tenant_id,
            bob.user_id,
            loom_core::TenantRole::Member
        ),
    );

    let results = [a, b];
    let demoted = results.iter().filter(|r| matches!(r, Ok(Some(_)))).count();
    let conflicted = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.code == loom_gateway::ErrorCode::Conflict))
        .count();
    assert_eq!(demoted, 1, "exactly one concurrent demotion wins");
    assert_eq!(conflicted, 1, "the loser conflicts instead of racing");

    let conn = harness.db.get_conn().await.expect("conn");
    let row = conn
        .query_one(
            "SELECT count(*) FROM tenant_memberships WHERE tenant_id = $1 AND role = 'owner'",
            &[&tenant.tenant_id.as_uuid()],
        )
        .await
        .expect("owner count");
    let owners: i64 = row.get(0);
    assert_eq!(owners, 1, "the tenant always keeps an owner");
}

/// The last owner can be neither demoted nor removed.
#[tokio::test]
async fn last_owner_is_protected() {
    let harness = harness().await;
    let (token, _, _) = signup(&harness.app).await;
    let (_, me) = send(
        &harness.app,
        json_request("GET", "/v1/portal/me", Some(&token), json!({})),
    )
    .await;
    let user_id = me["user"]["user_id"].as_str().expect("user id").to_string();

    let (status, body) = send(
        &harness.app,
        json_request(
            "PATCH",
            &format!("/v1/portal/members/{user_id}"),
            Some(&token),
            json!({"role": "member"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "demotion must conflict: {body}");

    let (status, _) = send(
        &harness.app,
        json_request(
            "DELETE",
            &format!("/v1/portal/members/{user_id}"),
            Some(&token),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
