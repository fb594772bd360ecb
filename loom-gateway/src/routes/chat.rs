//! Chat-completions pipeline
//!
//! The single data-plane entry point. Order of operations:
//!
//! 1. Authenticate the API key and resolve the effective configuration.
//! 2. Strip gateway-specific fields (`conversation_id`, `partition_id`).
//! 3. When conversations are enabled: materialise partition/conversation,
//!    load context, summarise past the token budget, inject history.
//! 4. Apply the agent's merge policies.
//! 5. Proxy to the resolved provider.
//! 6. Branch on the response: SSE is teed to the client and the trace
//!    sink; JSON may take one MCP round-trip, then records a trace,
//!    persists the turn fire-and-forget, and carries the conversation id
//!    back in body and header.
//!
//! Upstream non-2xx responses pass through verbatim. Failures on side
//! paths (trace, persistence, MCP, summarisation) are logged and
//! swallowed.

use crate::auth::{authenticate_api_key, bearer_token, RequestPrincipal};
use crate::conversation::ConversationManager;
use crate::error::{ApiError, ApiResult};
use crate::mcp::run_tool_round_trip;
use crate::merge::apply_merge_policies;
use crate::sse::{tee_sse_stream, OnStreamComplete, SseTeeContext};
use crate::state::AppState;
use crate::summarize::{pick_summary_model, summarise_context};
use crate::trace::TraceEvent;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{HeaderMap, HeaderName, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use loom_core::{Conversation, Partition};
use loom_llm::{assistant_content, extract_usage, ChatProvider, ProxyBody, ProxyRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Response header carrying the tracked conversation's external id.
pub const CONVERSATION_ID_HEADER: &str = "x-loom-conversation-id";

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Response> {
    let request_start = Instant::now();

    // ------------------------------------------------------------------
    // 1. Authenticate and resolve config
    // ------------------------------------------------------------------
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;
    let raw_key = bearer_token(auth_header)?;
    let principal =
        authenticate_api_key(&state.db, state.config.openai_api_key.as_deref(), raw_key).await?;

    let Json(mut body) =
        body.map_err(|e| ApiError::invalid_request(format!("Malformed request body: {e}")))?;
    if !body.is_object() {
        return Err(ApiError::invalid_request("Request body must be a JSON object"));
    }
    if !body.get("messages").map(Value::is_array).unwrap_or(false) {
        return Err(ApiError::invalid_request("Field 'messages' must be an array"));
    }

    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    // Concatenation of the caller's user-role messages, captured before
    // history injection, for conversation persistence.
    let caller_user_text = concat_user_messages(&body);

    // ------------------------------------------------------------------
    // 2. Strip gateway-specific fields
    // ------------------------------------------------------------------
    let object = body.as_object_mut().expect("checked to be an object");
    let conversation_external = take_string(object, "conversation_id");
    let partition_external = take_string(object, "partition_id");

    // ------------------------------------------------------------------
    // Provider (needed before conversations for the summariser sub-call)
    // ------------------------------------------------------------------
    let provider_config = principal
        .effective
        .provider_config
        .clone()
        .ok_or_else(|| ApiError::provider_misconfigured("no provider resolved"))?;
    let provider = state
        .providers
        .get_or_build(principal.tenant.tenant_id, &provider_config)?;

    // ------------------------------------------------------------------
    // 3. Conversation branch
    // ------------------------------------------------------------------
    let mut conversation: Option<Conversation> = None;
    let mut partition: Option<Partition> = None;
    if principal.agent.conversations_enabled && state.conversations.is_enabled() {
        let (conv, part) = prepare_conversation(
            &state,
            &principal,
            &provider,
            &mut body,
            conversation_external,
            partition_external,
        )
        .await?;
        conversation = Some(conv);
        partition = part;
    }

    // ------------------------------------------------------------------
    // 4. Merge policies
    // ------------------------------------------------------------------
    let mcp_endpoints =
        apply_merge_policies(&mut body, &principal.effective, &principal.agent.merge_policies);

    // ------------------------------------------------------------------
    // 5. Proxy
    // ------------------------------------------------------------------
    let upstream_start = Instant::now();
    let gateway_overhead_ms = upstream_start.duration_since(request_start).as_millis() as i64;

    let upstream = provider.proxy(ProxyRequest::new(body.clone())).await?;
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);

    // ------------------------------------------------------------------
    // 6. Branch on response type
    // ------------------------------------------------------------------
    match upstream.body {
        ProxyBody::Stream(stream) => {
            let mut builder = Response::builder().status(status);
            for (name, value) in upstream.headers.iter() {
                if !is_hop_header(name) {
                    builder = builder.header(name, value);
                }
            }
            if let Some(conv) = &conversation {
                builder = builder.header(CONVERSATION_ID_HEADER, conv.external_id.clone());
            }

            let on_complete: Option<OnStreamComplete> = conversation.clone().map(|conv| {
                let manager = state.conversations.clone();
                let user_text = caller_user_text.clone();
                Box::new(move |assistant: String, usage: Option<loom_llm::Usage>| {
                    manager.spawn_store_messages(
                        conv,
                        user_text,
                        assistant,
                        None,
                        usage.and_then(|u| u.completion_tokens),
                    );
                }) as OnStreamComplete
            });

            let context = SseTeeContext {
                tenant_id: principal.tenant.tenant_id,
                agent_id: Some(principal.agent.agent_id),
                model,
                provider: provider.provider_name().to_string(),
                request_body: body,
                upstream_status: upstream.status,
                request_start,
                gateway_overhead_ms,
            };
            let response_body =
                tee_sse_stream(stream, context, state.traces.clone(), on_complete);
            builder
                .body(response_body)
                .map_err(|e| ApiError::internal(format!("response build: {e}")))
        }

        ProxyBody::Json(mut value) => {
            // One MCP round-trip at most; failures keep the original body.
            if status.is_success() && !mcp_endpoints.is_empty() {
                if let Some(replacement) = run_tool_round_trip(
                    &state.mcp_http,
                    &provider,
                    &mcp_endpoints,
                    &body,
                    &value,
                )
                .await
                {
                    value = replacement;
                }
            }

            let latency_ms = request_start.elapsed().as_millis() as i64;
            let usage = extract_usage(&value);
            state.traces.record(TraceEvent {
                tenant_id: principal.tenant.tenant_id,
                agent_id: Some(principal.agent.agent_id),
                model: model.clone(),
                provider: provider.provider_name().to_string(),
                request: body.clone(),
                response: value.clone(),
                status_code: status.as_u16() as i32,
                latency_ms,
                usage,
                ttfb_ms: Some(upstream_start.elapsed().as_millis() as i64),
                gateway_overhead_ms: Some(gateway_overhead_ms),
            });

            if let Some(conv) = &conversation {
                if status.is_success() {
                    if let Some(assistant) = assistant_content(&value) {
                        state.conversations.spawn_store_messages(
                            conv.clone(),
                            caller_user_text,
                            assistant,
                            None,
                            usage.and_then(|u| u.completion_tokens),
                        );
                    }
                }
                if let Some(object) = value.as_object_mut() {
                    object.insert("conversation_id".to_string(), json!(conv.external_id));
                    if let Some(part) = &partition {
                        object.insert("partition_id".to_string(), json!(part.external_id));
                    }
                }
            }

            let mut builder = Response::builder()
                .status(status)
                .header(CONTENT_TYPE, "application/json");
            if let Some(conv) = &conversation {
                builder = builder.header(CONVERSATION_ID_HEADER, conv.external_id.clone());
            }
            builder
                .body(Body::from(serde_json::to_vec(&value)?))
                .map_err(|e| ApiError::internal(format!("response build: {e}")))
        }

        ProxyBody::Text(text) => {
            let latency_ms = request_start.elapsed().as_millis() as i64;
            state.traces.record(TraceEvent {
                tenant_id: principal.tenant.tenant_id,
                agent_id: Some(principal.agent.agent_id),
                model,
                provider: provider.provider_name().to_string(),
                request: body,
                response: Value::String(text.clone()),
                status_code: status.as_u16() as i32,
                latency_ms,
                usage: None,
                ttfb_ms: Some(upstream_start.elapsed().as_millis() as i64),
                gateway_overhead_ms: Some(gateway_overhead_ms),
            });

            let content_type = upstream
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("text/plain")
                .to_string();
            Response::builder()
                .status(status)
                .header(CONTENT_TYPE, content_type)
                .body(Body::from(text))
                .map_err(|e| ApiError::internal(format!("response build: {e}")))
        }
    }
}

// ============================================================================
// CONVERSATION PREPARATION
// ============================================================================

/// Steps 3a-3e: materialise partition and conversation, load context,
/// summarise past the budget, and prepend the injection messages.
async fn prepare_conversation(
    state: &AppState,
    principal: &RequestPrincipal,
    provider: &Arc<dyn ChatProvider>,
    body: &mut Value,
    conversation_external: Option<String>,
    partition_external: Option<String>,
) -> ApiResult<(Conversation, Option<Partition>)> {
    let tenant_id = principal.tenant.tenant_id;

    let partition = match &partition_external {
        Some(external_id) => Some(
            state
                .conversations
                .get_or_create_partition(tenant_id, external_id, None, None)
                .await?,
        ),
        None => None,
    };

    let external_id = conversation_external.unwrap_or_else(loom_crypto::mint_external_id);
    let conversation = state
        .conversations
        .get_or_create_conversation(
            tenant_id,
            &external_id,
            Some(principal.agent.agent_id),
            partition.as_ref().map(|p| p.partition_id),
        )
        .await?;

    let mut context = state.conversations.load_context(&conversation).await?;

    if context.needs_snapshot(principal.agent.conversation_token_limit) {
        let summary_model = pick_summary_model(
            &principal.agent,
            body.get("model").and_then(Value::as_str),
            &state.config.summary_model_fallback,
        );
        match summarise_context(provider, &context, &summary_model).await {
            Ok(summary) => {
                let archived = context.messages.len() as i32;
                match state
                    .conversations
                    .create_snapshot(&conversation, &summary, archived, context.snapshot_id)
                    .await
                {
                    Ok(_) => {
                        context = state.conversations.load_context(&conversation).await?;
                    }
                    Err(e) => {
                        tracing::warn!(
                            conversation_id = %conversation.conversation_id,
                            error = %e,
                            "snapshot creation failed; continuing with original context"
                        );
                    }
                }
            }
            Err(reason) => {
                tracing::warn!(
                    conversation_id = %conversation.conversation_id,
                    reason,
                    "summarisation failed; continuing with original context"
                );
            }
        }
    }

    let injection = ConversationManager::build_injection_messages(&context);
    if !injection.is_empty() {
        let caller_messages = body
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut combined = injection;
        combined.extend(caller_messages);
        body["messages"] = Value::Array(combined);
    }

    Ok((conversation, partition))
}

// ============================================================================
// HELPERS
// ============================================================================

fn take_string(object: &mut serde_json::Map<String, Value>, key: &str) -> Option<String> {
    object
        .remove(key)
        .and_then(|v| v.as_str().map(str::to_string))
}

fn concat_user_messages(body: &Value) -> String {
    body.get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter(|m| m.get("role").and_then(Value::as_str) == Some("user"))
                .filter_map(|m| m.get("content").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn is_hop_header(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONNECTION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_user_messages() {
        let body = json!({"messages": [
            {"role": "system", "content": "sys"},
            {"role": "user", "content": "first"},
            {"role": "assistant", "content": "reply"},
            {"role": "user", "content": "second"}
        ]});
        assert_eq!(concat_user_messages(&body), "first\nsecond");
        assert_eq!(concat_user_messages(&json!({})), "");
    }

    #[test]
    fn test_take_string_removes_field() {
        let mut body = json!({"conversation_id": "c1", "keep": true});
        let object = body.as_object_mut().expect("object");
        assert_eq!(take_string(object, "conversation_id").as_deref(), Some("c1"));
        assert!(object.get("conversation_id").is_none());
        assert!(object.get("keep").is_some());
        assert_eq!(take_string(object, "missing"), None);
    }

    #[test]
    fn test_hop_headers_filtered() {
        assert!(is_hop_header(&CONTENT_LENGTH));
        assert!(is_hop_header(&TRANSFER_ENCODING));
        assert!(!is_hop_header(&CONTENT_TYPE));
    }
}
