//! MCP Round-Trip
//!
//! When a JSON response contains tool-call directives whose names match
//! MCP endpoints from the effective configuration, the gateway performs at
//! most one round-trip: POST the arguments to each matching tool server,
//! append the results as `role: "tool"` messages and re-send through the
//! same provider. Any failure on this path returns the original response
//! unchanged; nested tool calls in the second response are passed to the
//! client unprocessed.

use loom_core::McpEndpoint;
use loom_llm::{extract_tool_calls, types::tool_arguments, ChatProvider, ProxyBody, ProxyRequest, ToolCall};
use serde_json::{json, Value};
use std::sync::Arc;

/// Execute the round-trip when the response calls any configured tool.
///
/// Returns the replacement body, or `None` to keep the original response
/// (no matching calls, or a failure along the way).
pub async fn run_tool_round_trip(
    http: &reqwest::Client,
    provider: &Arc<dyn ChatProvider>,
    endpoints: &[McpEndpoint],
    request_body: &Value,
    response_body: &Value,
) -> Option<Value> {
    let calls = extract_tool_calls(response_body);
    let matched: Vec<(&ToolCall, &McpEndpoint)> = calls
        .iter()
        .filter_map(|call| {
            endpoints
                .iter()
                .find(|endpoint| endpoint.name == call.name)
                .map(|endpoint| (call, endpoint))
        })
        .collect();
    if matched.is_empty() {
        return None;
    }

    match try_round_trip(http, provider, &matched, request_body, response_body).await {
        Ok(body) => Some(body),
        Err(reason) => {
            tracing::warn!(reason, "MCP round-trip failed; returning original response");
            None
        }
    }
}

async fn try_round_trip(
    http: &reqwest::Client,
    provider: &Arc<dyn ChatProvider>,
    matched: &[(&ToolCall, &McpEndpoint)],
    request_body: &Value,
    response_body: &Value,
) -> Result<Value, String> {
    // Collect each tool result with its call id.
    let mut results: Vec<(String, String)> = Vec::with_capacity(matched.len());
    for (call, endpoint) in matched {
        let content = invoke_tool(http, call, endpoint).await?;
        results.push((call.id.clone(), content));
    }

    // The assistant's tool_calls message must precede the tool results in
    // the follow-up transcript.
    let assistant_message = response_body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .cloned()
        .ok_or_else(|| "response has no assistant message".to_string())?;

    let mut follow_up = request_body.clone();
    let messages = follow_up
        .get_mut("messages")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| "request body has no messages array".to_string())?;
    messages.push(assistant_message);
    for (tool_call_id, content) in results {
        messages.push(json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }));
    }

    let second = provider
        .proxy(ProxyRequest::new(follow_up))
        .await
        .map_err(|e| e.to_string())?;
    if !(200..300).contains(&second.status) {
        return Err(format!("follow-up call returned status {}", second.status));
    }
    match second.body {
        ProxyBody::Json(value) => Ok(value),
        _ => Err("follow-up response was not JSON".to_string()),
    }
}

async fn invoke_tool(
    http: &reqwest::Client,
    call: &ToolCall,
    endpoint: &McpEndpoint,
) -> Result<String, String> {
    let mut request = http.post(&endpoint.url).json(&tool_arguments(call));
    if let Some(auth) = &endpoint.auth_header {
        request = request.header(reqwest::header::AUTHORIZATION, auth);
    }

    let response = request
        .send()
        .await
        .map_err(|e| format!("tool '{}' unreachable: {e}", call.name))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("tool '{}' returned status {status}", call.name));
    }
    response
        .text()
        .await
        .map_err(|e| format!("tool '{}' body unreadable: {e}", call.name))
}
