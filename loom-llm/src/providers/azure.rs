//! Azure-deployment-style provider

use super::{auth_header_value, dispatch, ChatProvider};
use crate::proxy::{ProxyRequest, ProxyResponse, UpstreamError};
use async_trait::async_trait;
use loom_core::ConfigResolveError;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Client;

static API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

/// Provider speaking the Azure OpenAI dialect:
/// `<base>/openai/deployments/<deployment>/chat/completions?api-version=<v>`
/// with an `api-key` header instead of bearer auth.
pub struct AzureProvider {
    client: Client,
    auth: HeaderValue,
    url: String,
}

impl AzureProvider {
    pub fn new(
        client: Client,
        api_key: &str,
        base_url: &str,
        deployment: &str,
        api_version: &str,
    ) -> Result<Self, ConfigResolveError> {
        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            auth: auth_header_value(api_key)?,
            url: format!(
                "{base}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            ),
        })
    }
}

#[async_trait]
impl ChatProvider for AzureProvider {
    fn provider_name(&self) -> &'static str {
        "azure"
    }

    fn chat_url(&self) -> &str {
        &self.url
    }

    async fn proxy(&self, request: ProxyRequest) -> Result<ProxyResponse, UpstreamError> {
        dispatch(
            &self.client,
            self.provider_name(),
            &self.url,
            (API_KEY_HEADER.clone(), self.auth.clone()),
            request,
        )
        .await
    }
}

impl std::fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProvider")
            .field("url", &self.url)
            .field("auth", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_shape() {
        let provider = AzureProvider::new(
            Client::new(),
            "key",
            "https://acme.openai.azure.com/",
            "gpt-4o",
            "2024-06-01",
        )
        .expect("build");
        assert_eq!(
            provider.chat_url(),
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }
}
