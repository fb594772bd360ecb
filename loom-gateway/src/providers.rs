//! Provider Cache
//!
//! Provider instances are cached per tenant and rebuilt when the tenant's
//! resolved provider configuration changes. Admin-plane mutations call
//! [`ProviderCache::evict`]; the config fingerprint check makes the cache
//! self-healing if an eviction is missed.

use crate::error::ApiResult;
use dashmap::DashMap;
use loom_core::{ProviderConfig, TenantId};
use loom_llm::{build_provider, ChatProvider};
use std::sync::Arc;
use std::time::Duration;

struct CachedProvider {
    config: ProviderConfig,
    provider: Arc<dyn ChatProvider>,
}

/// Process-wide cache of provider instances keyed by tenant.
pub struct ProviderCache {
    entries: DashMap<TenantId, CachedProvider>,
    client: reqwest::Client,
}

impl ProviderCache {
    /// Build the cache with a shared HTTP client carrying the provider
    /// call timeout.
    pub fn new(provider_timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(provider_timeout)
            .build()
            .map_err(|e| crate::error::ApiError::internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            entries: DashMap::new(),
            client,
        })
    }

    /// Get the cached provider for a tenant, building one when absent or
    /// when the resolved config no longer matches the cached instance.
    pub fn get_or_build(
        &self,
        tenant_id: TenantId,
        config: &ProviderConfig,
    ) -> ApiResult<Arc<dyn ChatProvider>> {
        if let Some(entry) = self.entries.get(&tenant_id) {
            if entry.config == *config {
                return Ok(entry.provider.clone());
            }
        }

        let provider = build_provider(self.client.clone(), config)?;
        self.entries.insert(
            tenant_id,
            CachedProvider {
                config: config.clone(),
                provider: provider.clone(),
            },
        );
        Ok(provider)
    }

    /// Drop the cached provider for a tenant. Called whenever the tenant's
    /// provider config is mutated on the admin plane.
    pub fn evict(&self, tenant_id: TenantId) {
        self.entries.remove(&tenant_id);
    }

    /// Number of cached instances (for the health endpoint).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
