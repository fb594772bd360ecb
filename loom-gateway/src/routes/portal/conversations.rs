//! Partition and conversation read routes

use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use loom_core::{ContextMessage, Conversation, Partition};

/// GET /v1/portal/partitions
pub async fn list_partitions(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Vec<Partition>>> {
    Ok(Json(state.db.partition_list(context.tenant_id).await?))
}

/// GET /v1/portal/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.db.conversation_list(context.tenant_id).await?))
}

/// GET /v1/portal/conversations/:external_id/messages - decrypted
/// transcript, any member.
pub async fn read_messages(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(external_id): Path<String>,
) -> ApiResult<Json<Vec<ContextMessage>>> {
    let conversation = state
        .db
        .conversation_find(context.tenant_id, &external_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation", &external_id))?;

    let messages = state.conversations.read_messages(&conversation).await?;
    Ok(Json(messages))
}
