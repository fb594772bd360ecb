//! Typed subset of provider bodies
//!
//! Request and response bodies are handled as opaque `serde_json::Value`
//! between ingress parsing and egress serialisation. Only the fields the
//! gateway actually inspects get typed accessors here.

use serde::{Deserialize, Serialize};

/// Token usage block of a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<i32>,
    #[serde(default)]
    pub completion_tokens: Option<i32>,
    #[serde(default)]
    pub total_tokens: Option<i32>,
}

/// One tool-call directive extracted from a JSON response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw `function.arguments` value - usually a JSON-encoded string.
    pub arguments: serde_json::Value,
}

/// Extract the `usage` object from a response body, if present.
pub fn extract_usage(body: &serde_json::Value) -> Option<Usage> {
    body.get("usage")
        .and_then(|u| serde_json::from_value(u.clone()).ok())
}

/// Extract `choices[0].message.content` from a response body.
pub fn assistant_content(body: &serde_json::Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Extract tool-call directives from `choices[0].message.tool_calls`.
/// Entries without an id or function name are skipped.
pub fn extract_tool_calls(body: &serde_json::Value) -> Vec<ToolCall> {
    let Some(calls) = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("tool_calls"))
        .and_then(|t| t.as_array())
    else {
        return Vec::new();
    };

    calls
        .iter()
        .filter_map(|call| {
            let id = call.get("id")?.as_str()?.to_string();
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = function
                .get("arguments")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Some(ToolCall {
                id,
                name,
                arguments,
            })
        })
        .collect()
}

/// Parse a tool call's `arguments` into a JSON value suitable for a tool
/// server POST. OpenAI encodes arguments as a JSON string; pass structured
/// values through unchanged.
pub fn tool_arguments(call: &ToolCall) -> serde_json::Value {
    match &call.arguments {
        serde_json::Value::String(s) => {
            serde_json::from_str(s).unwrap_or(serde_json::Value::String(s.clone()))
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_usage() {
        let body = json!({"usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}});
        let usage = extract_usage(&body).expect("usage present");
        assert_eq!(usage.prompt_tokens, Some(10));
        assert_eq!(usage.completion_tokens, Some(5));
        assert_eq!(usage.total_tokens, Some(15));

        assert!(extract_usage(&json!({})).is_none());
    }

    #[test]
    fn test_extract_usage_partial() {
        let body = json!({"usage": {"total_tokens": 7}});
        let usage = extract_usage(&body).expect("usage present");
        assert_eq!(usage.prompt_tokens, None);
        assert_eq!(usage.total_tokens, Some(7));
    }

    #[test]
    fn test_assistant_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "pong"}}]});
        assert_eq!(assistant_content(&body).as_deref(), Some("pong"));
        assert_eq!(assistant_content(&json!({"choices": []})), None);
    }

    #[test]
    fn test_extract_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "get_time", "arguments": "{\"tz\":\"UTC\"}"}},
                        {"id": "call_2", "function": {"arguments": "{}"}}
                    ]
                }
            }]
        });
        let calls = extract_tool_calls(&body);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "get_time");
        assert_eq!(tool_arguments(&calls[0]), json!({"tz": "UTC"}));
    }

    #[test]
    fn test_tool_arguments_passthrough() {
        let call = ToolCall {
            id: "c".to_string(),
            name: "n".to_string(),
            arguments: json!({"already": "structured"}),
        };
        assert_eq!(tool_arguments(&call), json!({"already": "structured"}));

        let garbled = ToolCall {
            id: "c".to_string(),
            name: "n".to_string(),
            arguments: json!("not json at all"),
        };
        assert_eq!(tool_arguments(&garbled), json!("not json at all"));
    }
}
