//! Portal authentication routes: signup, login, me

use crate::auth::generate_portal_token;
use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use loom_core::{TenantRole, TenantStatus, User};
use serde::{Deserialize, Serialize};

const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub tenant_name: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub token: String,
    pub user: User,
    pub tenant: loom_core::Tenant,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub tenant_id: loom_core::TenantId,
    pub name: String,
    pub role: TenantRole,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub tenants: Vec<TenantSummary>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /v1/portal/auth/signup
///
/// Creates the user, their tenant, an owner membership and a Default
/// agent, and returns a portal token for the new tenant.
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    if !request.email.contains('@') {
        return Err(ApiError::invalid_request("Invalid email address"));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if request.tenant_name.trim().is_empty() {
        return Err(ApiError::invalid_request("Tenant name must not be empty"));
    }

    let password_hash = loom_crypto::hash_password(&request.password)?;
    let user = state.db.user_create(&request.email, &password_hash).await?;
    let tenant = state.db.tenant_create(request.tenant_name.trim(), None).await?;
    state
        .db
        .membership_create(user.user_id, tenant.tenant_id, TenantRole::Owner)
        .await?;
    state.db.agent_create(tenant.tenant_id, "Default").await?;

    let token = generate_portal_token(
        &state.auth,
        user.user_id,
        tenant.tenant_id,
        TenantRole::Owner,
    )?;

    tracing::info!(user_id = %user.user_id, tenant_id = %tenant.tenant_id, "new signup");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            token,
            user,
            tenant,
        }),
    ))
}

/// POST /v1/portal/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .db
        .user_find_by_email(&request.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !loom_crypto::verify_password(&user.password_hash, &request.password)? {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let memberships = state.db.memberships_for_user(user.user_id).await?;
    let active: Vec<_> = memberships
        .iter()
        .filter(|m| m.tenant_status == TenantStatus::Active)
        .collect();
    let primary = active
        .first()
        .ok_or_else(|| ApiError::forbidden("User has no active tenant memberships"))?;

    let token = generate_portal_token(
        &state.auth,
        user.user_id,
        primary.membership.tenant_id,
        primary.membership.role,
    )?;

    let tenants = active
        .iter()
        .map(|m| TenantSummary {
            tenant_id: m.membership.tenant_id,
            name: m.tenant_name.clone(),
            role: m.membership.role,
        })
        .collect();

    Ok(Json(LoginResponse {
        token,
        user,
        tenants,
    }))
}

/// GET /v1/portal/me
pub async fn me(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .db
        .user_get(context.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", context.user_id))?;

    let memberships = state.db.memberships_for_user(user.user_id).await?;
    let tenants = memberships
        .iter()
        .filter(|m| m.tenant_status == TenantStatus::Active)
        .map(|m| TenantSummary {
            tenant_id: m.membership.tenant_id,
            name: m.tenant_name.clone(),
            role: m.membership.role,
        })
        .collect();

    let token = generate_portal_token(&state.auth, context.user_id, context.tenant_id, context.role)?;
    Ok(Json(LoginResponse {
        token,
        user,
        tenants,
    }))
}
