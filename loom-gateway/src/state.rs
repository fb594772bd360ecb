//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthConfig;
use crate::config::GatewayConfig;
use crate::conversation::ConversationManager;
use crate::db::DbClient;
use crate::error::ApiResult;
use crate::providers::ProviderCache;
use crate::trace::{spawn_sink, TraceSink, TraceSinkConfig};
use loom_crypto::PayloadCipher;
use tokio::task::JoinHandle;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: DbClient,
    pub config: Arc<GatewayConfig>,
    pub auth: Arc<AuthConfig>,
    pub cipher: Option<Arc<PayloadCipher>>,
    pub providers: Arc<ProviderCache>,
    pub traces: TraceSink,
    pub conversations: ConversationManager,
    /// Client for MCP tool-server POSTs, bounded by the MCP timeout.
    pub mcp_http: reqwest::Client,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the process-wide singletons. Returns the state plus the trace
    /// drainer handle for shutdown draining.
    pub fn build(
        db: DbClient,
        config: GatewayConfig,
        auth: AuthConfig,
    ) -> ApiResult<(Self, Option<JoinHandle<()>>)> {
        let cipher = match &config.encryption_master_key {
            Some(key) => Some(Arc::new(PayloadCipher::from_hex_key(key)?)),
            None => None,
        };

        let sink_config = TraceSinkConfig::from(&config);
        let (traces, drainer) = spawn_sink(cipher.clone(), db.clone(), sink_config);

        let providers = Arc::new(ProviderCache::new(config.provider_timeout)?);
        let conversations = ConversationManager::new(db.clone(), cipher.clone());

        let mcp_http = reqwest::Client::builder()
            .timeout(config.mcp_timeout)
            .build()
            .map_err(|e| crate::error::ApiError::internal(format!("HTTP client: {e}")))?;

        Ok((
            Self {
                db,
                config: Arc::new(config),
                auth: Arc::new(auth),
                cipher,
                providers,
                traces,
                conversations,
                mcp_http,
                start_time: Instant::now(),
            },
            drainer,
        ))
    }
}
