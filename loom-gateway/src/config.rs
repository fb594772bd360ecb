//! Gateway Configuration Module
//!
//! Runtime configuration for the gateway process, loaded from environment
//! variables with development-friendly defaults. Database and auth secrets
//! have their own config structs (`db::DbConfig`, `auth::AuthConfig`).

use std::time::Duration;

// ============================================================================
// GATEWAY CONFIGURATION
// ============================================================================

/// Process-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen host, default 0.0.0.0.
    pub host: String,

    /// Listen port, default 3000.
    pub port: u16,

    /// Timeout for upstream provider calls (default 60 s). Applies to the
    /// whole request including SSE body delivery.
    pub provider_timeout: Duration,

    /// Timeout for MCP tool-server POSTs (default 15 s).
    pub mcp_timeout: Duration,

    /// Fallback model for summarisation sub-calls when neither the agent
    /// nor the caller names one.
    pub summary_model_fallback: String,

    /// Fallback OpenAI API key for tenants without explicit credentials.
    pub openai_api_key: Option<String>,

    /// 64-char hex AES-256-GCM master key. Absence degrades the trace sink
    /// to a no-op and disables conversation persistence.
    pub encryption_master_key: Option<String>,

    /// Bound of the trace queue (default 1000 rows).
    pub trace_queue_capacity: usize,

    /// Trace flush interval (default 1 s).
    pub trace_flush_interval: Duration,

    /// Maximum rows per trace flush batch (default 100).
    pub trace_flush_batch: usize,

    /// How long shutdown waits for the trace queue to drain (default 5 s).
    pub shutdown_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            provider_timeout: Duration::from_secs(60),
            mcp_timeout: Duration::from_secs(15),
            summary_model_fallback: "gpt-4o-mini".to_string(),
            openai_api_key: None,
            encryption_master_key: None,
            trace_queue_capacity: 1000,
            trace_flush_interval: Duration::from_secs(1),
            trace_flush_batch: 100,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    /// Create gateway configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `HOST` / `PORT`: listen address (default 0.0.0.0:3000)
    /// - `ENCRYPTION_MASTER_KEY`: 64-char hex AES-256-GCM key
    /// - `OPENAI_API_KEY`: fallback provider credential
    /// - `LOOM_PROVIDER_TIMEOUT_SECS`: upstream call timeout (default 60)
    /// - `LOOM_MCP_TIMEOUT_SECS`: tool-server call timeout (default 15)
    /// - `LOOM_SUMMARY_MODEL`: summariser fallback model (default gpt-4o-mini)
    /// - `LOOM_TRACE_QUEUE_CAPACITY`: trace queue bound (default 1000)
    /// - `LOOM_TRACE_FLUSH_INTERVAL_MS`: flush cadence (default 1000)
    /// - `LOOM_TRACE_FLUSH_BATCH`: max rows per flush (default 100)
    /// - `LOOM_SHUTDOWN_TIMEOUT_SECS`: drain bound on shutdown (default 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            provider_timeout: env_parse("LOOM_PROVIDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            mcp_timeout: env_parse("LOOM_MCP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.mcp_timeout),
            summary_model_fallback: std::env::var("LOOM_SUMMARY_MODEL")
                .unwrap_or(defaults.summary_model_fallback),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            encryption_master_key: std::env::var("ENCRYPTION_MASTER_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            trace_queue_capacity: env_parse("LOOM_TRACE_QUEUE_CAPACITY")
                .unwrap_or(defaults.trace_queue_capacity),
            trace_flush_interval: env_parse("LOOM_TRACE_FLUSH_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.trace_flush_interval),
            trace_flush_batch: env_parse("LOOM_TRACE_FLUSH_BATCH")
                .unwrap_or(defaults.trace_flush_batch),
            shutdown_timeout: env_parse("LOOM_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
