//! SSE Tee
//!
//! The streaming branch of the pipeline pipes the upstream byte stream
//! through a tee that (a) forwards bytes verbatim to the client and
//! (b) feeds an [`SseAccumulator`] so the full assistant text can be
//! recorded. On stream end a response-like object is synthesised and
//! handed to the trace recorder. A client disconnect aborts the upstream
//! connection and flushes a partial trace with a 499-equivalent status.

use crate::trace::{TraceEvent, TraceSink};
use axum::body::Body;
use bytes::Bytes;
use futures_util::StreamExt;
use loom_core::{AgentId, TenantId};
use loom_llm::proxy::ByteStream;
use loom_llm::{SseAccumulator, Usage};
use std::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

/// Client-disconnect status recorded on partial traces.
const CLIENT_CLOSED_REQUEST: i32 = 499;

/// Trace context carried into the tee task.
pub struct SseTeeContext {
    pub tenant_id: TenantId,
    pub agent_id: Option<AgentId>,
    pub model: String,
    pub provider: String,
    pub request_body: serde_json::Value,
    pub upstream_status: u16,
    pub request_start: Instant,
    pub gateway_overhead_ms: i64,
}

/// Callback invoked with the accumulated assistant text and usage once the
/// upstream stream ends cleanly.
pub type OnStreamComplete = Box<dyn FnOnce(String, Option<Usage>) + Send + 'static>;

/// Tee an upstream SSE stream into a response body.
///
/// Bytes are forwarded verbatim; the spawned task owns the upstream
/// stream, so when the client goes away (the returned body is dropped)
/// the send fails, the loop breaks and dropping the stream aborts the
/// upstream connection.
pub fn tee_sse_stream(
    upstream: ByteStream,
    context: SseTeeContext,
    sink: TraceSink,
    on_complete: Option<OnStreamComplete>,
) -> Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(16);

    tokio::spawn(async move {
        let mut upstream = upstream;
        let mut accumulator = SseAccumulator::new();
        let mut client_gone = false;
        let mut ttfb_ms: Option<i64> = None;

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    if ttfb_ms.is_none() {
                        ttfb_ms = Some(context.request_start.elapsed().as_millis() as i64);
                    }
                    accumulator.feed(&bytes);
                    if tx.send(Ok(bytes)).await.is_err() {
                        client_gone = true;
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "upstream SSE stream failed mid-flight");
                    let _ = tx.send(Err(std::io::Error::other(e))).await;
                    break;
                }
            }
        }
        // Dropping the stream here closes the upstream connection.
        drop(upstream);

        if client_gone {
            tracing::debug!(
                bytes = accumulator.bytes_seen(),
                "client disconnected during SSE stream"
            );
        }

        let status_code = if client_gone {
            CLIENT_CLOSED_REQUEST
        } else {
            context.upstream_status as i32
        };
        let latency_ms = context.request_start.elapsed().as_millis() as i64;
        let usage = accumulator.usage();
        let assistant_text = accumulator.content().to_string();
        let response = accumulator.into_response_value(&context.model);

        sink.record(TraceEvent {
            tenant_id: context.tenant_id,
            agent_id: context.agent_id,
            model: context.model,
            provider: context.provider,
            request: context.request_body,
            response,
            status_code,
            latency_ms,
            usage,
            ttfb_ms,
            gateway_overhead_ms: Some(context.gateway_overhead_ms),
        });

        if !client_gone {
            if let Some(on_complete) = on_complete {
                on_complete(assistant_text, usage);
            }
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}
