//! Invite lifecycle routes

use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use loom_core::{Invite, InviteId, TenantMembership};
use serde::{Deserialize, Serialize};

const DEFAULT_EXPIRY_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Deserialize, Default)]
pub struct CreateInviteRequest {
    pub max_uses: Option<i32>,
    pub expires_in_secs: Option<i64>,
}

/// The token is only returned here, at creation time.
#[derive(Debug, Serialize)]
pub struct CreateInviteResponse {
    #[serde(flatten)]
    pub invite: Invite,
    pub token: String,
}

/// POST /v1/portal/invites
pub async fn create_invite(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Json(request): Json<CreateInviteRequest>,
) -> ApiResult<impl IntoResponse> {
    context.require_owner()?;

    if request.max_uses.is_some_and(|n| n <= 0) {
        return Err(ApiError::invalid_request("max_uses must be positive"));
    }
    let expires_in = request.expires_in_secs.unwrap_or(DEFAULT_EXPIRY_SECS);
    if expires_in <= 0 {
        return Err(ApiError::invalid_request("expires_in_secs must be positive"));
    }

    let token = loom_crypto::mint_invite_token();
    let invite = state
        .db
        .invite_create(
            context.tenant_id,
            &token,
            request.max_uses,
            Utc::now() + Duration::seconds(expires_in),
            context.user_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateInviteResponse { invite, token }),
    ))
}

/// GET /v1/portal/invites
pub async fn list_invites(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Vec<Invite>>> {
    Ok(Json(state.db.invite_list(context.tenant_id).await?))
}

/// DELETE /v1/portal/invites/:invite_id - revoke.
pub async fn revoke_invite(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(invite_id): Path<InviteId>,
) -> ApiResult<StatusCode> {
    context.require_owner()?;
    let revoked = state.db.invite_revoke(context.tenant_id, invite_id).await?;
    if !revoked {
        return Err(ApiError::not_found("Invite", invite_id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteRequest {
    pub token: String,
}

/// POST /v1/portal/invites/accept - join the inviting tenant as a member.
///
/// Validity (not revoked, not expired, uses remaining) is checked before
/// any membership is created.
pub async fn accept_invite(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Json(request): Json<AcceptInviteRequest>,
) -> ApiResult<Json<TenantMembership>> {
    let membership = state
        .db
        .invite_accept(&request.token, context.user_id)
        .await?;
    tracing::info!(
        user_id = %context.user_id,
        tenant_id = %membership.tenant_id,
        "invite accepted"
    );
    Ok(Json(membership))
}
