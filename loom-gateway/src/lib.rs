//! Loom Gateway - Request-Plane Engine
//!
//! A multi-tenant gateway between client applications and upstream
//! chat-completion providers. Each inbound request is authenticated,
//! its tenant/agent configuration resolved through an inheritance chain,
//! composed with conversation memory and agent merge policies, proxied to
//! the resolved provider (JSON or SSE), recorded as an encrypted trace,
//! and optionally routed through a single MCP tool round-trip.

pub mod auth;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod mcp;
pub mod merge;
pub mod middleware;
pub mod providers;
pub mod resolver;
pub mod routes;
pub mod sse;
pub mod state;
pub mod summarize;
pub mod trace;

// Re-export commonly used types
pub use auth::{
    authenticate_api_key, bearer_token, generate_portal_token, validate_admin_token,
    validate_portal_token, AuthConfig, JwtSecret, PortalClaims, PortalContext, RequestPrincipal,
};
pub use config::GatewayConfig;
pub use conversation::ConversationManager;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use merge::apply_merge_policies;
pub use providers::ProviderCache;
pub use resolver::{merge_chain, resolve_agent_config, resolve_tenant_config, ConfigLevel};
pub use routes::create_router;
pub use state::AppState;
pub use trace::{TraceEvent, TraceSink};
