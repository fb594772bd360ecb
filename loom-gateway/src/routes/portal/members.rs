//! Member and role management
//!
//! Mutations preserve the invariant that every active tenant keeps at
//! least one owner. The check-then-mutate runs inside a single
//! transaction in the db layer, so concurrent demotions or removals
//! cannot race each other past the owner count.

use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use loom_core::{TenantMembership, TenantRole, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    #[serde(flatten)]
    pub membership: TenantMembership,
    pub email: String,
}

/// GET /v1/portal/members
pub async fn list_members(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Vec<MemberResponse>>> {
    let members = state.db.members_of_tenant(context.tenant_id).await?;
    Ok(Json(
        members
            .into_iter()
            .map(|m| MemberResponse {
                membership: m.membership,
                email: m.email,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: TenantRole,
}

/// PATCH /v1/portal/members/:user_id
///
/// Demoting the last owner conflicts (409).
pub async fn update_member_role(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(user_id): Path<UserId>,
    Json(request): Json<UpdateRoleRequest>,
) -> ApiResult<Json<TenantMembership>> {
    context.require_owner()?;

    let membership = state
        .db
        .membership_update_role(context.tenant_id, user_id, request.role)
        .await?
        .ok_or_else(|| ApiError::not_found("Member", user_id))?;
    Ok(Json(membership))
}

/// DELETE /v1/portal/members/:user_id
///
/// Removing the last owner conflicts (409).
pub async fn remove_member(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Path(user_id): Path<UserId>,
) -> ApiResult<StatusCode> {
    context.require_owner()?;

    let removed = state
        .db
        .membership_delete(context.tenant_id, user_id)
        .await?;
    if !removed {
        return Err(ApiError::not_found("Member", user_id));
    }
    Ok(StatusCode::NO_CONTENT)
}
