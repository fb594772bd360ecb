//! Tenant routes: read, config updates, child tenants, suspension

use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::resolver;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use loom_core::{ConfigOverrides, EffectiveConfig, Tenant, TenantStatus};
use serde::Deserialize;

/// GET /v1/portal/tenant - the token's tenant.
pub async fn get_tenant(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Tenant>> {
    let tenant = state
        .db
        .tenant_get(context.tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant", context.tenant_id))?;
    Ok(Json(tenant))
}

/// PATCH /v1/portal/tenant - replace the tenant's override block.
///
/// The body is the full set of overrideable fields; omitted fields become
/// null (inherit). A provider-config change evicts the cached provider.
pub async fn update_tenant(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Json(overrides): Json<ConfigOverrides>,
) -> ApiResult<Json<Tenant>> {
    context.require_owner()?;

    let before = state
        .db
        .tenant_get(context.tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant", context.tenant_id))?;

    let tenant = state
        .db
        .tenant_update_overrides(context.tenant_id, &overrides)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant", context.tenant_id))?;

    if before.overrides.provider_config != tenant.overrides.provider_config {
        state.providers.evict(context.tenant_id);
        tracing::info!(tenant_id = %context.tenant_id, "provider config changed; cache evicted");
    }

    Ok(Json(tenant))
}

/// GET /v1/portal/tenant/config - the resolved effective configuration
/// with its inheritance chain, for debugging.
pub async fn effective_config(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<EffectiveConfig>> {
    let tenant = state
        .db
        .tenant_get(context.tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant", context.tenant_id))?;
    let effective = resolver::resolve_tenant_config(&state.db, &tenant).await?;
    Ok(Json(effective))
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
}

/// POST /v1/portal/tenants - create a child tenant of the current one.
pub async fn create_child_tenant(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Json(request): Json<CreateTenantRequest>,
) -> ApiResult<impl IntoResponse> {
    context.require_owner()?;
    if request.name.trim().is_empty() {
        return Err(ApiError::invalid_request("Tenant name must not be empty"));
    }

    // The parent chain must terminate before we hang a child off it.
    resolver::ensure_no_parent_cycle(&state.db, context.tenant_id).await?;

    let child = state
        .db
        .tenant_create(request.name.trim(), Some(context.tenant_id))
        .await?;
    state
        .db
        .membership_create(context.user_id, child.tenant_id, loom_core::TenantRole::Owner)
        .await?;

    Ok((StatusCode::CREATED, Json(child)))
}

/// POST /v1/portal/tenant/suspend - take the tenant off the data plane.
pub async fn suspend_tenant(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
) -> ApiResult<Json<Tenant>> {
    context.require_owner()?;

    state
        .db
        .tenant_set_status(context.tenant_id, TenantStatus::Suspended)
        .await?;
    state.providers.evict(context.tenant_id);

    let tenant = state
        .db
        .tenant_get(context.tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant", context.tenant_id))?;
    tracing::info!(tenant_id = %context.tenant_id, "tenant suspended");
    Ok(Json(tenant))
}
