//! Summarisation sub-call
//!
//! When a conversation's token estimate exceeds the agent's budget, the
//! pipeline sends a single-turn request through the same provider asking
//! for a summary of the prior transcript. Failures are logged and
//! swallowed; the request falls through with the original context.

use loom_core::{Agent, ConversationContext};
use loom_llm::{assistant_content, ChatProvider, ProxyBody, ProxyRequest};
use serde_json::json;
use std::sync::Arc;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You summarise conversations. Produce a concise summary that preserves the \
     facts, decisions, names and open questions needed to continue the \
     conversation. Reply with the summary only.";

/// Model used for the sub-call: the agent's summary model, else the
/// caller's model, else the configured fallback.
pub fn pick_summary_model(agent: &Agent, caller_model: Option<&str>, fallback: &str) -> String {
    agent
        .conversation_summary_model
        .as_deref()
        .or(caller_model)
        .unwrap_or(fallback)
        .to_string()
}

/// Run the summarisation sub-call and extract the assistant content.
pub async fn summarise_context(
    provider: &Arc<dyn ChatProvider>,
    context: &ConversationContext,
    model: &str,
) -> Result<String, String> {
    let body = json!({
        "model": model,
        "stream": false,
        "messages": [
            {"role": "system", "content": SUMMARY_SYSTEM_PROMPT},
            {
                "role": "user",
                "content": format!(
                    "Summarise the following conversation:\n\n{}",
                    context.transcript()
                ),
            }
        ]
    });

    let response = provider
        .proxy(ProxyRequest::new(body))
        .await
        .map_err(|e| e.to_string())?;
    if !(200..300).contains(&response.status) {
        return Err(format!("summariser returned status {}", response.status));
    }
    match response.body {
        ProxyBody::Json(value) => {
            assistant_content(&value).ok_or_else(|| "summariser response had no content".to_string())
        }
        _ => Err("summariser response was not JSON".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use loom_core::{AgentId, MergePolicies, TenantId};

    fn agent(summary_model: Option<&str>) -> Agent {
        let now = Utc::now();
        Agent {
            agent_id: AgentId::generate(),
            tenant_id: TenantId::generate(),
            name: "Default".to_string(),
            overrides: Default::default(),
            merge_policies: MergePolicies::default(),
            conversations_enabled: true,
            conversation_token_limit: 4000,
            conversation_summary_model: summary_model.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_model_priority() {
        // Agent's own summary model wins
        assert_eq!(
            pick_summary_model(&agent(Some("gpt-4o-mini")), Some("gpt-4o"), "fallback"),
            "gpt-4o-mini"
        );
        // Caller's model next
        assert_eq!(
            pick_summary_model(&agent(None), Some("gpt-4o"), "fallback"),
            "gpt-4o"
        );
        // Fallback last
        assert_eq!(pick_summary_model(&agent(None), None, "fallback"), "fallback");
    }
}
