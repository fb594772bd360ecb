//! API-key lifecycle routes
//!
//! The raw key is returned exactly once, at creation. Only the SHA-256
//! hash (lookup index) and a 12-char display prefix are stored.

use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use loom_core::{AgentId, ApiKey, ApiKeyId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    #[serde(flatten)]
    pub api_key: ApiKey,
    /// The raw key. Shown only in this response.
    pub key: String,
}

/// POST /v1/portal/agents/:agent_id/keys
pub async fn create_key(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(agent_id): Path<AgentId>,
    Json(request): Json<CreateKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    context.require_owner()?;
    if request.name.trim().is_empty() {
        return Err(ApiError::invalid_request("Key name must not be empty"));
    }

    // The agent must belong to the token's tenant.
    state
        .db
        .agent_get_in_tenant(context.tenant_id, agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Agent", agent_id))?;

    let raw = loom_crypto::mint_api_key();
    let api_key = state
        .db
        .api_key_create(
            agent_id,
            context.tenant_id,
            request.name.trim(),
            &loom_crypto::key_hash(&raw),
            &loom_crypto::key_prefix(&raw),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse { api_key, key: raw }),
    ))
}

/// GET /v1/portal/keys
pub async fn list_keys(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Vec<ApiKey>>> {
    Ok(Json(state.db.api_key_list(context.tenant_id).await?))
}

/// DELETE /v1/portal/keys/:key_id - revoke. Revoked keys never
/// authenticate again.
pub async fn revoke_key(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(key_id): Path<ApiKeyId>,
) -> ApiResult<StatusCode> {
    context.require_owner()?;
    let revoked = state.db.api_key_revoke(context.tenant_id, key_id).await?;
    if !revoked {
        return Err(ApiError::not_found("API key", key_id));
    }
    Ok(StatusCode::NO_CONTENT)
}
