//! OpenAI-style provider

use super::{auth_header_value, dispatch, ChatProvider};
use crate::proxy::{ProxyRequest, ProxyResponse, UpstreamError};
use async_trait::async_trait;
use loom_core::ConfigResolveError;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Client;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Provider speaking the stock OpenAI dialect: `<base>/v1/chat/completions`
/// with bearer auth. Also covers OpenAI-compatible gateways via `base_url`.
pub struct OpenAiProvider {
    client: Client,
    auth: HeaderValue,
    url: String,
}

impl OpenAiProvider {
    pub fn new(
        client: Client,
        api_key: &str,
        base_url: Option<&str>,
    ) -> Result<Self, ConfigResolveError> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client,
            auth: auth_header_value(&format!("Bearer {api_key}"))?,
            url: format!("{base}/v1/chat/completions"),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn chat_url(&self) -> &str {
        &self.url
    }

    async fn proxy(&self, request: ProxyRequest) -> Result<ProxyResponse, UpstreamError> {
        dispatch(
            &self.client,
            self.provider_name(),
            &self.url,
            (AUTHORIZATION, self.auth.clone()),
            request,
        )
        .await
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("url", &self.url)
            .field("auth", &"[REDACTED]")
            .finish()
    }
}
