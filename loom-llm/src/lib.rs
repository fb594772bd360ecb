//! Loom LLM - Provider Abstraction
//!
//! A single contract, `ChatProvider::proxy`, covering two upstream
//! chat-completion dialects:
//!
//! - **OpenAI-style**: `<base>/v1/chat/completions`, bearer auth
//! - **Azure-style**: `<base>/openai/deployments/<dep>/chat/completions`,
//!   `api-key` header
//!
//! URL shape, auth header and response-format differences are encapsulated
//! here. Provider bodies are schema-loose: the gateway inspects only a small
//! typed subset (see [`types`]) and everything else is round-tripped as
//! opaque JSON or raw SSE bytes.

pub mod providers;
pub mod proxy;
pub mod sse;
pub mod types;

pub use providers::{build_provider, AzureProvider, ChatProvider, OpenAiProvider};
pub use proxy::{ProxyBody, ProxyRequest, ProxyResponse, UpstreamError};
pub use sse::SseAccumulator;
pub use types::{assistant_content, extract_tool_calls, extract_usage, ToolCall, Usage};
