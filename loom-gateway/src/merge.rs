//! Request Merge Policies
//!
//! When a caller submits a chat-completions body, the agent's effective
//! configuration is folded in according to three independent policies:
//! system prompt (prepend / append / overwrite / ignore) and skills and
//! MCP endpoints (merge / overwrite / ignore, deduplicated by name with
//! the agent-supplied entry winning on collision).
//!
//! Skills materialise into the upstream `tools` array; MCP endpoints are
//! gateway-side routing state and never travel upstream, so any
//! caller-supplied `mcp_endpoints` field is stripped from the body here.

use loom_core::{
    EffectiveConfig, ListMergePolicy, McpEndpoint, MergePolicies, PromptPolicy, SkillDefinition,
};
use serde_json::{json, Value};

/// Fold the agent's effective configuration into the caller body and
/// return the MCP endpoint set to route tool calls against.
pub fn apply_merge_policies(
    body: &mut Value,
    effective: &EffectiveConfig,
    policies: &MergePolicies,
) -> Vec<McpEndpoint> {
    apply_system_prompt(body, effective.system_prompt.as_deref(), policies.system_prompt);
    apply_skills(body, effective.skills.as_deref(), policies.skills);
    merge_mcp_endpoints(body, effective.mcp_endpoints.as_deref(), policies.mcp_endpoints)
}

// ============================================================================
// SYSTEM PROMPT
// ============================================================================

fn apply_system_prompt(body: &mut Value, prompt: Option<&str>, policy: PromptPolicy) {
    let Some(prompt) = prompt else {
        return;
    };
    if policy == PromptPolicy::Ignore {
        return;
    }

    let synthetic = json!({"role": "system", "content": prompt});
    let messages = ensure_messages(body);

    match policy {
        PromptPolicy::Prepend => messages.insert(0, synthetic),
        PromptPolicy::Append => messages.push(synthetic),
        PromptPolicy::Overwrite => {
            messages.retain(|m| m.get("role").and_then(Value::as_str) != Some("system"));
            messages.insert(0, synthetic);
        }
        PromptPolicy::Ignore => unreachable!(),
    }
}

fn ensure_messages(body: &mut Value) -> &mut Vec<Value> {
    if !body.get("messages").map(Value::is_array).unwrap_or(false) {
        body["messages"] = Value::Array(Vec::new());
    }
    body["messages"]
        .as_array_mut()
        .expect("messages was just ensured to be an array")
}

// ============================================================================
// SKILLS (TOOLS)
// ============================================================================

fn apply_skills(body: &mut Value, skills: Option<&[SkillDefinition]>, policy: ListMergePolicy) {
    let Some(skills) = skills else {
        return;
    };
    if policy == ListMergePolicy::Ignore {
        return;
    }

    let agent_tools: Vec<Value> = skills
        .iter()
        .filter_map(|skill| serde_json::to_value(skill).ok())
        .collect();

    match policy {
        ListMergePolicy::Overwrite => {
            body["tools"] = Value::Array(agent_tools);
        }
        ListMergePolicy::Merge => {
            let caller_tools = body
                .get("tools")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            // Set-union keyed by name; the agent's definition wins.
            let agent_names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
            let mut merged = agent_tools;
            for tool in caller_tools {
                let collides = SkillDefinition::name_of(&tool)
                    .map(|name| agent_names.contains(&name))
                    .unwrap_or(false);
                if !collides {
                    merged.push(tool);
                }
            }
            body["tools"] = Value::Array(merged);
        }
        ListMergePolicy::Ignore => unreachable!(),
    }
}

// ============================================================================
// MCP ENDPOINTS
// ============================================================================

/// Combine agent and caller MCP endpoints per policy. The caller's
/// `mcp_endpoints` field is always removed from the body - it is
/// gateway-specific and not upstream-valid.
fn merge_mcp_endpoints(
    body: &mut Value,
    agent_endpoints: Option<&[McpEndpoint]>,
    policy: ListMergePolicy,
) -> Vec<McpEndpoint> {
    let caller_endpoints: Vec<McpEndpoint> = body
        .as_object_mut()
        .and_then(|obj| obj.remove("mcp_endpoints"))
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let agent_endpoints = agent_endpoints.unwrap_or_default();

    match policy {
        ListMergePolicy::Ignore => caller_endpoints,
        ListMergePolicy::Overwrite => {
            if agent_endpoints.is_empty() {
                caller_endpoints
            } else {
                agent_endpoints.to_vec()
            }
        }
        ListMergePolicy::Merge => {
            let mut merged = agent_endpoints.to_vec();
            for endpoint in caller_endpoints {
                if !merged.iter().any(|e| e.name == endpoint.name) {
                    merged.push(endpoint);
                }
            }
            merged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::EffectiveConfig;

    fn skill(name: &str) -> SkillDefinition {
        SkillDefinition {
            name: name.to_string(),
            definition: json!({"type": "function"}),
        }
    }

    fn effective_with_prompt(prompt: &str) -> EffectiveConfig {
        EffectiveConfig {
            system_prompt: Some(prompt.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepend_places_system_first() {
        let mut body = json!({"messages": [{"role": "user", "content": "hi"}]});
        apply_merge_policies(
            &mut body,
            &effective_with_prompt("AGENT"),
            &MergePolicies::default(),
        );
        let messages = body["messages"].as_array().expect("array");
        assert_eq!(messages[0], json!({"role": "system", "content": "AGENT"}));
        assert_eq!(messages[1]["content"], "hi");
    }

    #[test]
    fn test_append_places_system_last() {
        let mut body = json!({"messages": [{"role": "user", "content": "hi"}]});
        let policies = MergePolicies {
            system_prompt: PromptPolicy::Append,
            ..Default::default()
        };
        apply_merge_policies(&mut body, &effective_with_prompt("AGENT"), &policies);
        let messages = body["messages"].as_array().expect("array");
        assert_eq!(messages.last().expect("non-empty")["content"], "AGENT");
    }

    #[test]
    fn test_overwrite_leaves_exactly_one_system_message() {
        let mut body = json!({"messages": [
            {"role": "system", "content": "CALLER"},
            {"role": "user", "content": "hi"},
            {"role": "system", "content": "CALLER2"}
        ]});
        let policies = MergePolicies {
            system_prompt: PromptPolicy::Overwrite,
            ..Default::default()
        };
        apply_merge_policies(&mut body, &effective_with_prompt("AGENT"), &policies);

        let messages = body["messages"].as_array().expect("array");
        let system: Vec<_> = messages
            .iter()
            .filter(|m| m["role"] == "system")
            .collect();
        assert_eq!(system.len(), 1);
        assert_eq!(system[0]["content"], "AGENT");
        assert_eq!(messages[0]["content"], "AGENT");
    }

    #[test]
    fn test_ignore_leaves_body_untouched() {
        let original = json!({"messages": [{"role": "user", "content": "hi"}]});
        let mut body = original.clone();
        let policies = MergePolicies {
            system_prompt: PromptPolicy::Ignore,
            ..Default::default()
        };
        apply_merge_policies(&mut body, &effective_with_prompt("AGENT"), &policies);
        assert_eq!(body, original);
    }

    #[test]
    fn test_no_prompt_no_injection() {
        let original = json!({"messages": [{"role": "user", "content": "hi"}]});
        let mut body = original.clone();
        apply_merge_policies(&mut body, &EffectiveConfig::default(), &MergePolicies::default());
        assert_eq!(body, original);
    }

    #[test]
    fn test_skills_merge_dedup_agent_wins() {
        let mut body = json!({"tools": [
            {"name": "a", "source": "caller"},
            {"name": "b", "source": "caller"}
        ]});
        let effective = EffectiveConfig {
            skills: Some(vec![skill("a")]),
            ..Default::default()
        };
        apply_merge_policies(&mut body, &effective, &MergePolicies::default());

        let tools = body["tools"].as_array().expect("array");
        assert_eq!(tools.len(), 2);
        // Agent's "a" wins the collision
        let a = tools.iter().find(|t| t["name"] == "a").expect("a present");
        assert!(a.get("source").is_none());
        assert!(tools.iter().any(|t| t["name"] == "b"));
    }

    #[test]
    fn test_skills_merge_handles_function_nested_names() {
        let mut body = json!({"tools": [
            {"type": "function", "function": {"name": "a"}},
            {"type": "function", "function": {"name": "c"}}
        ]});
        let effective = EffectiveConfig {
            skills: Some(vec![skill("a")]),
            ..Default::default()
        };
        apply_merge_policies(&mut body, &effective, &MergePolicies::default());
        let tools = body["tools"].as_array().expect("array");
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn test_skills_overwrite() {
        let mut body = json!({"tools": [{"name": "caller_tool"}]});
        let effective = EffectiveConfig {
            skills: Some(vec![skill("agent_tool")]),
            ..Default::default()
        };
        let policies = MergePolicies {
            skills: ListMergePolicy::Overwrite,
            ..Default::default()
        };
        apply_merge_policies(&mut body, &effective, &policies);
        let tools = body["tools"].as_array().expect("array");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "agent_tool");
    }

    #[test]
    fn test_mcp_endpoints_stripped_and_merged() {
        let mut body = json!({
            "messages": [],
            "mcp_endpoints": [
                {"name": "caller_tool", "url": "http://caller.local"},
                {"name": "shared", "url": "http://caller.local/shared"}
            ]
        });
        let effective = EffectiveConfig {
            mcp_endpoints: Some(vec![McpEndpoint {
                name: "shared".to_string(),
                url: "http://agent.local/shared".to_string(),
                auth_header: None,
            }]),
            ..Default::default()
        };
        let endpoints = apply_merge_policies(&mut body, &effective, &MergePolicies::default());

        // Field never travels upstream
        assert!(body.get("mcp_endpoints").is_none());
        assert_eq!(endpoints.len(), 2);
        let shared = endpoints.iter().find(|e| e.name == "shared").expect("shared");
        assert_eq!(shared.url, "http://agent.local/shared");
        assert!(endpoints.iter().any(|e| e.name == "caller_tool"));
    }

    #[test]
    fn test_mcp_ignore_uses_caller_only() {
        let mut body = json!({"mcp_endpoints": [{"name": "x", "url": "http://x"}]});
        let effective = EffectiveConfig {
            mcp_endpoints: Some(vec![McpEndpoint {
                name: "agent".to_string(),
                url: "http://agent".to_string(),
                auth_header: None,
            }]),
            ..Default::default()
        };
        let policies = MergePolicies {
            mcp_endpoints: ListMergePolicy::Ignore,
            ..Default::default()
        };
        let endpoints = apply_merge_policies(&mut body, &effective, &policies);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].name, "x");
    }

    #[test]
    fn test_prompt_injection_creates_messages_array() {
        let mut body = json!({});
        apply_merge_policies(
            &mut body,
            &effective_with_prompt("AGENT"),
            &MergePolicies::default(),
        );
        assert_eq!(body["messages"][0]["content"], "AGENT");
    }
}
