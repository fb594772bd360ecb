//! Agent routes

use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use loom_core::{Agent, AgentId, ConfigOverrides, MergePolicies};
use serde::Deserialize;

/// GET /v1/portal/agents
pub async fn list_agents(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.db.agent_list(context.tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
}

/// POST /v1/portal/agents
pub async fn create_agent(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Json(request): Json<CreateAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    context.require_owner()?;
    if request.name.trim().is_empty() {
        return Err(ApiError::invalid_request("Agent name must not be empty"));
    }
    let agent = state
        .db
        .agent_create(context.tenant_id, request.name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /v1/portal/agents/:agent_id
pub async fn get_agent(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<Agent>> {
    let agent = state
        .db
        .agent_get_in_tenant(context.tenant_id, agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Agent", agent_id))?;
    Ok(Json(agent))
}

/// Partial update; provided fields replace the stored values. The
/// override block, when present, is replaced wholesale.
#[derive(Debug, Deserialize, Default)]
pub struct UpdateAgentRequest {
    pub name: Option<String>,
    pub overrides: Option<ConfigOverrides>,
    pub merge_policies: Option<MergePolicies>,
    pub conversations_enabled: Option<bool>,
    pub conversation_token_limit: Option<i32>,
    // Double-option: absent = leave, null = clear.
    #[serde(default, with = "double_option")]
    pub conversation_summary_model: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

/// PATCH /v1/portal/agents/:agent_id
pub async fn update_agent(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(agent_id): Path<AgentId>,
    Json(request): Json<UpdateAgentRequest>,
) -> ApiResult<Json<Agent>> {
    context.require_owner()?;

    let mut agent = state
        .db
        .agent_get_in_tenant(context.tenant_id, agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Agent", agent_id))?;

    let provider_changed = request
        .overrides
        .as_ref()
        .map(|o| o.provider_config != agent.overrides.provider_config)
        .unwrap_or(false);

    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(ApiError::invalid_request("Agent name must not be empty"));
        }
        agent.name = name.trim().to_string();
    }
    if let Some(overrides) = request.overrides {
        agent.overrides = overrides;
    }
    if let Some(policies) = request.merge_policies {
        agent.merge_policies = policies;
    }
    if let Some(enabled) = request.conversations_enabled {
        agent.conversations_enabled = enabled;
    }
    if let Some(limit) = request.conversation_token_limit {
        if limit <= 0 {
            return Err(ApiError::invalid_request(
                "conversation_token_limit must be positive",
            ));
        }
        agent.conversation_token_limit = limit;
    }
    if let Some(model) = request.conversation_summary_model {
        agent.conversation_summary_model = model;
    }

    let agent = state.db.agent_update(&agent).await?;
    if provider_changed {
        state.providers.evict(context.tenant_id);
    }
    Ok(Json(agent))
}

/// DELETE /v1/portal/agents/:agent_id
pub async fn delete_agent(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<StatusCode> {
    context.require_owner()?;
    let deleted = state.db.agent_delete(context.tenant_id, agent_id).await?;
    if !deleted {
        return Err(ApiError::not_found("Agent", agent_id));
    }
    Ok(StatusCode::NO_CONTENT)
}
