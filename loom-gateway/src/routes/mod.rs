//! HTTP surface assembly
//!
//! Data plane: `POST /v1/chat/completions` (API-key auth, handled inside
//! the handler). Portal plane: the `/v1/portal/**` tree behind the portal
//! bearer-token middleware, with signup/login left public.

pub mod chat;
pub mod health;
pub mod portal;

use crate::middleware::portal_auth_middleware;
use crate::state::AppState;
use axum::routing::{delete, get, patch, post};
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete gateway router.
pub fn create_router(state: AppState) -> Router {
    let portal_public = Router::new()
        .route("/auth/signup", post(portal::auth::signup))
        .route("/auth/login", post(portal::auth::login));

    let portal_private = Router::new()
        .route("/me", get(portal::auth::me))
        .route(
            "/tenant",
            get(portal::tenants::get_tenant).patch(portal::tenants::update_tenant),
        )
        .route("/tenant/config", get(portal::tenants::effective_config))
        .route("/tenant/suspend", post(portal::tenants::suspend_tenant))
        .route("/tenants", post(portal::tenants::create_child_tenant))
        .route(
            "/agents",
            get(portal::agents::list_agents).post(portal::agents::create_agent),
        )
        .route(
            "/agents/:agent_id",
            get(portal::agents::get_agent)
                .patch(portal::agents::update_agent)
                .delete(portal::agents::delete_agent),
        )
        .route("/agents/:agent_id/keys", post(portal::api_keys::create_key))
        .route("/keys", get(portal::api_keys::list_keys))
        .route("/keys/:key_id", delete(portal::api_keys::revoke_key))
        .route(
            "/invites",
            get(portal::invites::list_invites).post(portal::invites::create_invite),
        )
        .route("/invites/:invite_id", delete(portal::invites::revoke_invite))
        .route("/invites/accept", post(portal::invites::accept_invite))
        .route("/members", get(portal::members::list_members))
        .route(
            "/members/:user_id",
            patch(portal::members::update_member_role).delete(portal::members::remove_member),
        )
        .route("/partitions", get(portal::conversations::list_partitions))
        .route("/conversations", get(portal::conversations::list_conversations))
        .route(
            "/conversations/:external_id/messages",
            get(portal::conversations::read_messages),
        )
        .route("/traces", get(portal::traces::list_traces))
        .route("/traces/aggregates", get(portal::traces::trace_aggregates))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            portal_auth_middleware,
        ));

    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .nest("/v1/portal", portal_public.merge(portal_private))
        .route("/healthz", get(health::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
