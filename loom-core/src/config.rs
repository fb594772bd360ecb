//! Configuration-inheritance model
//!
//! Tenants form a rooted forest; agents hang off tenants. Each level may
//! contribute provider credentials, a system prompt, skills, MCP endpoints
//! and an available-models list. The resolver in the gateway walks the
//! agent -> tenant -> parent chain and merges these with
//! nearest-non-null-wins semantics, producing an [`EffectiveConfig`].

use crate::{ListMergePolicy, PromptPolicy};
use serde::{Deserialize, Serialize};

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Upstream provider dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Azure,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Azure => "azure",
        }
    }
}

/// Provider credentials and endpoint shape, stored per tenant or agent.
///
/// For `openai` only `api_key` is meaningful besides the optional
/// `base_url`; for `azure` the key, endpoint, deployment and API version
/// must all be present before a request can be composed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

// ============================================================================
// SKILLS AND MCP ENDPOINTS
// ============================================================================

/// An OpenAI-tools-format tool definition injected into upstream requests.
///
/// Only the name is interpreted (it keys deduplication); the definition
/// itself is carried opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub name: String,
    #[serde(flatten)]
    pub definition: serde_json::Value,
}

impl SkillDefinition {
    /// Extract the dedup key from a raw tool value. OpenAI nests the name
    /// under `function.name`; flat `name` is accepted as well.
    pub fn name_of(value: &serde_json::Value) -> Option<&str> {
        value
            .get("function")
            .and_then(|f| f.get("name"))
            .or_else(|| value.get("name"))
            .and_then(|n| n.as_str())
    }
}

/// A tool-server address an agent may route a single tool-call round-trip to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
}

// ============================================================================
// MERGE POLICIES
// ============================================================================

/// Per-agent request-time merge policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MergePolicies {
    #[serde(default)]
    pub system_prompt: PromptPolicy,
    #[serde(default)]
    pub skills: ListMergePolicy,
    #[serde(default)]
    pub mcp_endpoints: ListMergePolicy,
}

// ============================================================================
// EFFECTIVE CONFIGURATION
// ============================================================================

/// One level of the inheritance chain, kept for debugging output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritanceLevel {
    /// "agent", "tenant", or "parent-tenant"
    pub level: String,
    pub name: String,
    pub id: uuid::Uuid,
}

/// The merged configuration for one agent (or tenant, on the admin plane).
///
/// Each field holds the nearest non-null value along the chain; `None`
/// means no level contributed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EffectiveConfig {
    pub provider_config: Option<ProviderConfig>,
    pub system_prompt: Option<String>,
    pub skills: Option<Vec<SkillDefinition>>,
    pub mcp_endpoints: Option<Vec<McpEndpoint>>,
    pub available_models: Option<Vec<String>>,
    /// Chain that produced this config, nearest level first.
    pub chain: Vec<InheritanceLevel>,
}

impl EffectiveConfig {
    /// Look up an MCP endpoint by tool name.
    pub fn mcp_endpoint(&self, name: &str) -> Option<&McpEndpoint> {
        self.mcp_endpoints
            .as_deref()
            .and_then(|eps| eps.iter().find(|ep| ep.name == name))
    }
}

/// The overrideable configuration fields one chain level contributes.
/// `None` always means "inherit from the next level up".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigOverrides {
    pub provider_config: Option<ProviderConfig>,
    pub system_prompt: Option<String>,
    pub skills: Option<Vec<SkillDefinition>>,
    pub mcp_endpoints: Option<Vec<McpEndpoint>>,
    pub available_models: Option<Vec<String>>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.provider_config.is_none()
            && self.system_prompt.is_none()
            && self.skills.is_none()
            && self.mcp_endpoints.is_none()
            && self.available_models.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skill_name_extraction() {
        let nested = json!({"type": "function", "function": {"name": "get_time"}});
        assert_eq!(SkillDefinition::name_of(&nested), Some("get_time"));

        let flat = json!({"name": "search"});
        assert_eq!(SkillDefinition::name_of(&flat), Some("search"));

        let anonymous = json!({"type": "function"});
        assert_eq!(SkillDefinition::name_of(&anonymous), None);
    }

    #[test]
    fn test_effective_config_endpoint_lookup() {
        let config = EffectiveConfig {
            mcp_endpoints: Some(vec![McpEndpoint {
                name: "get_weather".to_string(),
                url: "http://tools.internal/weather".to_string(),
                auth_header: None,
            }]),
            ..Default::default()
        };
        assert!(config.mcp_endpoint("get_weather").is_some());
        assert!(config.mcp_endpoint("get_time").is_none());
    }

    #[test]
    fn test_provider_config_serde() {
        let config = ProviderConfig {
            provider: ProviderKind::Azure,
            api_key: Some("k".to_string()),
            base_url: Some("https://example.openai.azure.com".to_string()),
            deployment: Some("gpt-4o".to_string()),
            api_version: Some("2024-06-01".to_string()),
        };
        let json = serde_json::to_value(&config).expect("serialize");
        assert_eq!(json["provider"], "azure");
        let back: ProviderConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, config);
    }
}
