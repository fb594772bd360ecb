//! Provider implementations
//!
//! Both dialects share one dispatch path: rewrite URL and auth header,
//! strip the inbound `Host`, send, then branch on the upstream
//! `Content-Type`. Non-2xx statuses pass through verbatim - they are never
//! rewritten into gateway errors.

mod azure;
mod openai;

pub use azure::AzureProvider;
pub use openai::OpenAiProvider;

use crate::proxy::{ProxyBody, ProxyRequest, ProxyResponse, UpstreamError};
use async_trait::async_trait;
use futures_util::StreamExt;
use loom_core::{ConfigResolveError, ProviderConfig, ProviderKind};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use reqwest::Client;
use std::sync::Arc;

/// Uniform contract over upstream chat-completion dialects.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name recorded in traces ("openai" / "azure").
    fn provider_name(&self) -> &'static str;

    /// Resolved chat-completions URL for this provider instance.
    fn chat_url(&self) -> &str;

    /// Send a composed request upstream and classify the response body.
    async fn proxy(&self, request: ProxyRequest) -> Result<ProxyResponse, UpstreamError>;
}

/// Build a provider instance from a resolved, credential-complete config.
///
/// # Errors
/// `ProviderMisconfigured` when required Azure fields are missing or a
/// credential cannot be carried in a header.
pub fn build_provider(
    client: Client,
    config: &ProviderConfig,
) -> Result<Arc<dyn ChatProvider>, ConfigResolveError> {
    match config.provider {
        ProviderKind::OpenAi => {
            let api_key = require(config.api_key.as_deref(), "api_key")?;
            Ok(Arc::new(OpenAiProvider::new(
                client,
                api_key,
                config.base_url.as_deref(),
            )?))
        }
        ProviderKind::Azure => {
            let api_key = require(config.api_key.as_deref(), "api_key")?;
            let base_url = require(config.base_url.as_deref(), "endpoint")?;
            let deployment = require(config.deployment.as_deref(), "deployment")?;
            let api_version = require(config.api_version.as_deref(), "api_version")?;
            Ok(Arc::new(AzureProvider::new(
                client,
                api_key,
                base_url,
                deployment,
                api_version,
            )?))
        }
    }
}

fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ConfigResolveError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigResolveError::ProviderMisconfigured {
            reason: format!("missing required field '{field}'"),
        })
}

pub(crate) fn auth_header_value(value: &str) -> Result<HeaderValue, ConfigResolveError> {
    HeaderValue::from_str(value).map_err(|_| ConfigResolveError::ProviderMisconfigured {
        reason: "credential contains characters not representable in a header".to_string(),
    })
}

/// Shared send-and-classify path for both dialects.
pub(crate) async fn dispatch(
    client: &Client,
    provider: &'static str,
    url: &str,
    auth: (HeaderName, HeaderValue),
    request: ProxyRequest,
) -> Result<ProxyResponse, UpstreamError> {
    let mut headers = request.headers;
    headers.remove(HOST);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let (auth_name, auth_value) = auth;
    headers.insert(auth_name, auth_value);

    let response = client
        .post(url)
        .headers(headers)
        .json(&request.body)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(provider, error = %e, "upstream request failed");
            UpstreamError::from(e)
        })?;

    let status = response.status().as_u16();
    let response_headers = response.headers().clone();
    let content_type = response_headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = if content_type.starts_with("text/event-stream") {
        ProxyBody::Stream(response.bytes_stream().boxed())
    } else {
        let text = response.text().await?;
        if content_type.starts_with("application/json") {
            match serde_json::from_str(&text) {
                Ok(value) => ProxyBody::Json(value),
                Err(_) => ProxyBody::Text(text),
            }
        } else {
            ProxyBody::Text(text)
        }
    };

    Ok(ProxyResponse {
        status,
        headers: response_headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::ProviderConfig;

    fn azure_config() -> ProviderConfig {
        ProviderConfig {
            provider: ProviderKind::Azure,
            api_key: Some("key".to_string()),
            base_url: Some("https://acme.openai.azure.com".to_string()),
            deployment: Some("gpt-4o".to_string()),
            api_version: Some("2024-06-01".to_string()),
        }
    }

    #[test]
    fn test_build_openai_provider() {
        let config = ProviderConfig {
            provider: ProviderKind::OpenAi,
            api_key: Some("sk-test".to_string()),
            base_url: None,
            deployment: None,
            api_version: None,
        };
        let provider = build_provider(Client::new(), &config).expect("build");
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(
            provider.chat_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_azure_provider() {
        let provider = build_provider(Client::new(), &azure_config()).expect("build");
        assert_eq!(provider.provider_name(), "azure");
        assert_eq!(
            provider.chat_url(),
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_azure_requires_all_fields() {
        for field in ["api_key", "base_url", "deployment", "api_version"] {
            let mut config = azure_config();
            match field {
                "api_key" => config.api_key = None,
                "base_url" => config.base_url = None,
                "deployment" => config.deployment = None,
                _ => config.api_version = None,
            }
            let err = match build_provider(Client::new(), &config) {
                Err(e) => e,
                Ok(_) => panic!("must fail"),
            };
            assert!(matches!(
                err,
                ConfigResolveError::ProviderMisconfigured { .. }
            ));
        }
    }

    #[test]
    fn test_empty_credential_rejected() {
        let mut config = azure_config();
        config.api_key = Some(String::new());
        assert!(build_provider(Client::new(), &config).is_err());
    }
}
