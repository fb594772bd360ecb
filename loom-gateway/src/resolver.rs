//! Config Resolver
//!
//! Produces an effective configuration from an agent (data plane) or a
//! tenant (admin read) by walking the inheritance chain leaf-first:
//! agent -> tenant -> parent tenant -> ... -> root. Each level contributes
//! its own non-null fields; the merge is nearest-non-null-wins per field.
//! The resolver also validates provider credentials, applying the
//! environment OpenAI fallback where allowed.

use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use loom_core::{
    Agent, ConfigOverrides, ConfigResolveError, EffectiveConfig, InheritanceLevel,
    ProviderConfig, ProviderKind, Tenant, TenantId,
};
use std::collections::HashSet;

/// Hard bound on chain depth, matching the cycle guard.
const MAX_CHAIN_DEPTH: usize = 32;

/// One level of the inheritance chain, ready for merging.
#[derive(Debug, Clone)]
pub struct ConfigLevel {
    pub level: &'static str,
    pub name: String,
    pub id: uuid::Uuid,
    pub overrides: ConfigOverrides,
}

impl ConfigLevel {
    pub fn agent(agent: &Agent) -> Self {
        Self {
            level: "agent",
            name: agent.name.clone(),
            id: agent.agent_id.as_uuid(),
            overrides: agent.overrides.clone(),
        }
    }

    pub fn tenant(tenant: &Tenant, is_parent: bool) -> Self {
        Self {
            level: if is_parent { "parent-tenant" } else { "tenant" },
            name: tenant.name.clone(),
            id: tenant.tenant_id.as_uuid(),
            overrides: tenant.overrides.clone(),
        }
    }
}

/// Merge a chain of config levels, nearest level first.
///
/// Pure function so the nearest-non-null-wins semantics are testable
/// without a database.
pub fn merge_chain(levels: Vec<ConfigLevel>) -> EffectiveConfig {
    let mut effective = EffectiveConfig::default();
    for level in &levels {
        let overrides = &level.overrides;
        if effective.provider_config.is_none() {
            effective.provider_config = overrides.provider_config.clone();
        }
        if effective.system_prompt.is_none() {
            effective.system_prompt = overrides.system_prompt.clone();
        }
        if effective.skills.is_none() {
            effective.skills = overrides.skills.clone();
        }
        if effective.mcp_endpoints.is_none() {
            effective.mcp_endpoints = overrides.mcp_endpoints.clone();
        }
        if effective.available_models.is_none() {
            effective.available_models = overrides.available_models.clone();
        }
    }
    effective.chain = levels
        .into_iter()
        .map(|level| InheritanceLevel {
            level: level.level.to_string(),
            name: level.name,
            id: level.id,
        })
        .collect();
    effective
}

/// Validate provider credentials and apply the OpenAI environment
/// fallback: a missing or key-less `openai` config falls back to the
/// gateway's `OPENAI_API_KEY`; `azure` must be fully specified.
pub fn finalize_provider(
    effective: &mut EffectiveConfig,
    openai_fallback: Option<&str>,
) -> Result<(), ConfigResolveError> {
    let fallback_key = openai_fallback
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    match effective.provider_config.as_mut() {
        None => {
            let api_key = fallback_key.ok_or_else(|| ConfigResolveError::ProviderMisconfigured {
                reason: "no provider configured and no OPENAI_API_KEY fallback set".to_string(),
            })?;
            effective.provider_config = Some(ProviderConfig {
                provider: ProviderKind::OpenAi,
                api_key: Some(api_key),
                base_url: None,
                deployment: None,
                api_version: None,
            });
            Ok(())
        }
        Some(config) => match config.provider {
            ProviderKind::OpenAi => {
                if config.api_key.as_deref().is_none_or(str::is_empty) {
                    config.api_key =
                        Some(fallback_key.ok_or_else(|| {
                            ConfigResolveError::ProviderMisconfigured {
                                reason: "openai provider has no api_key and no fallback"
                                    .to_string(),
                            }
                        })?);
                }
                Ok(())
            }
            ProviderKind::Azure => {
                for (field, value) in [
                    ("api_key", &config.api_key),
                    ("endpoint", &config.base_url),
                    ("deployment", &config.deployment),
                    ("api_version", &config.api_version),
                ] {
                    if value.as_deref().is_none_or(str::is_empty) {
                        return Err(ConfigResolveError::ProviderMisconfigured {
                            reason: format!("azure provider is missing '{field}'"),
                        });
                    }
                }
                Ok(())
            }
        },
    }
}

/// Walk the parent chain of a tenant, appending config levels. The visited
/// set guards against accidental cycles in stored data.
async fn walk_parents(
    db: &DbClient,
    start: &Tenant,
    levels: &mut Vec<ConfigLevel>,
) -> ApiResult<()> {
    let mut visited: HashSet<TenantId> = HashSet::new();
    visited.insert(start.tenant_id);

    let mut parent_id = start.parent_tenant_id;
    while let Some(id) = parent_id {
        if !visited.insert(id) || visited.len() > MAX_CHAIN_DEPTH {
            return Err(ConfigResolveError::ParentCycle { tenant_id: id }.into());
        }
        let parent = db
            .tenant_get(id)
            .await?
            .ok_or(ConfigResolveError::TenantNotFound { tenant_id: id })?;
        levels.push(ConfigLevel::tenant(&parent, true));
        parent_id = parent.parent_tenant_id;
    }
    Ok(())
}

/// Resolve the effective configuration for a data-plane agent.
pub async fn resolve_agent_config(
    db: &DbClient,
    agent: &Agent,
    tenant: &Tenant,
    openai_fallback: Option<&str>,
) -> ApiResult<EffectiveConfig> {
    let mut levels = vec![ConfigLevel::agent(agent), ConfigLevel::tenant(tenant, false)];
    walk_parents(db, tenant, &mut levels).await?;

    let mut effective = merge_chain(levels);
    finalize_provider(&mut effective, openai_fallback)?;
    Ok(effective)
}

/// Resolve the effective configuration for a tenant (admin read). Provider
/// credentials are not validated here; the admin surface shows whatever is
/// configured, complete or not.
pub async fn resolve_tenant_config(db: &DbClient, tenant: &Tenant) -> ApiResult<EffectiveConfig> {
    let mut levels = vec![ConfigLevel::tenant(tenant, false)];
    walk_parents(db, tenant, &mut levels).await?;
    Ok(merge_chain(levels))
}

/// Cycle check for tenant creation: walking up from `parent_id` must
/// terminate without revisiting a node.
pub async fn ensure_no_parent_cycle(db: &DbClient, parent_id: TenantId) -> ApiResult<()> {
    let mut visited: HashSet<TenantId> = HashSet::new();
    let mut current = Some(parent_id);
    while let Some(id) = current {
        if !visited.insert(id) || visited.len() > MAX_CHAIN_DEPTH {
            return Err(ApiError::conflict("Tenant parent chain contains a cycle"));
        }
        current = db
            .tenant_get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Tenant", id))?
            .parent_tenant_id;
    }
    Ok(())
}
