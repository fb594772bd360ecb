//! Axum Middleware for Portal Authentication
//!
//! Validates the portal bearer token, injects [`PortalContext`] into
//! request extensions and exposes a typed extractor for handlers. The
//! data plane does not use middleware: the chat handler authenticates
//! explicitly so that failed auth never produces a trace row.

use crate::auth::{bearer_token, validate_portal_token, PortalContext};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

/// Portal-plane authentication middleware.
///
/// Expects `Authorization: Bearer <jwt>` signed with the portal secret;
/// injects [`PortalContext`] on success.
pub async fn portal_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let token = bearer_token(header)?;
    let context = validate_portal_token(&state.auth, token)?;
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Typed extractor for the authenticated portal context.
///
/// Requires `portal_auth_middleware` on the route; a missing context is a
/// wiring bug and surfaces as 500.
#[derive(Debug, Clone)]
pub struct PortalExtractor(pub PortalContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PortalExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PortalContext>()
            .cloned()
            .map(PortalExtractor)
            .ok_or_else(|| {
                ApiError::internal(
                    "PortalContext not found in request extensions. \
                     Ensure portal_auth_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for PortalExtractor {
    type Target = PortalContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
