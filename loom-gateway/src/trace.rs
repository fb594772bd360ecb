//! Trace Recorder
//!
//! Best-effort asynchronous sink: `record` encrypts the request/response
//! bodies under the tenant-scoped key, enqueues a row and returns
//! immediately. A background drainer flushes rows to the trace store in
//! batches. On store failure, drop-oldest eviction keeps the retry buffer
//! bounded; dropped traces are counted.
//!
//! When the master key is missing the sink degrades to a no-op and
//! requests continue to succeed.

use crate::config::GatewayConfig;
use crate::db::{DbClient, NewTrace};
use crate::error::ApiResult;
use chrono::Utc;
use loom_core::{AgentId, TenantId, TraceId};
use loom_crypto::PayloadCipher;
use loom_llm::Usage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ============================================================================
// TRACE EVENT
// ============================================================================

/// One proxied request/response pair, pre-encryption.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub tenant_id: TenantId,
    pub agent_id: Option<AgentId>,
    pub model: String,
    pub provider: String,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub status_code: i32,
    pub latency_ms: i64,
    pub usage: Option<Usage>,
    pub ttfb_ms: Option<i64>,
    pub gateway_overhead_ms: Option<i64>,
}

// ============================================================================
// TRACE SINK
// ============================================================================

/// Drainer tuning knobs, extracted from the gateway config.
#[derive(Debug, Clone)]
pub struct TraceSinkConfig {
    pub queue_capacity: usize,
    pub flush_interval: Duration,
    pub flush_batch: usize,
}

impl From<&GatewayConfig> for TraceSinkConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            queue_capacity: config.trace_queue_capacity,
            flush_interval: config.trace_flush_interval,
            flush_batch: config.trace_flush_batch,
        }
    }
}

#[derive(Clone)]
struct SinkInner {
    tx: mpsc::Sender<NewTrace>,
    cipher: Arc<PayloadCipher>,
}

/// Process-wide trace sink handle. Cheap to clone; `record` never blocks
/// the request path.
#[derive(Clone)]
pub struct TraceSink {
    inner: Option<SinkInner>,
    dropped: Arc<AtomicU64>,
}

impl TraceSink {
    /// A sink that drops everything. Used when the master key is absent.
    pub fn disabled() -> Self {
        Self {
            inner: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build a sink over an existing channel. Exposed for tests; services
    /// use [`spawn_sink`].
    pub fn with_channel(cipher: Arc<PayloadCipher>, tx: mpsc::Sender<NewTrace>) -> Self {
        Self {
            inner: Some(SinkInner { tx, cipher }),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Number of traces dropped because of a full queue or store failure.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Encrypt and enqueue one trace. Returns immediately; failures are
    /// counted and logged, never surfaced to the request path.
    pub fn record(&self, event: TraceEvent) {
        let Some(inner) = &self.inner else {
            return;
        };

        let aad = event.tenant_id.to_string();
        let encrypted = encrypt_bodies(&inner.cipher, &event, aad.as_bytes());
        let (request, response) = match encrypted {
            Ok(pair) => pair,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "failed to encrypt trace; dropping");
                return;
            }
        };

        let usage = event.usage.unwrap_or_default();
        let row = NewTrace {
            trace_id: TraceId::generate(),
            tenant_id: event.tenant_id,
            agent_id: event.agent_id,
            model: event.model,
            provider: event.provider,
            request,
            response,
            status_code: event.status_code,
            latency_ms: event.latency_ms,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            ttfb_ms: event.ttfb_ms,
            gateway_overhead_ms: event.gateway_overhead_ms,
            created_at: Utc::now(),
        };

        if inner.tx.try_send(row).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(dropped_total = total, "trace queue full; dropping trace");
        }
    }
}

fn encrypt_bodies(
    cipher: &PayloadCipher,
    event: &TraceEvent,
    aad: &[u8],
) -> ApiResult<(loom_core::EncryptedBlob, loom_core::EncryptedBlob)> {
    let request_bytes = serde_json::to_vec(&event.request)?;
    let response_bytes = serde_json::to_vec(&event.response)?;
    let request = cipher.encrypt(&request_bytes, Some(aad))?;
    let response = cipher.encrypt(&response_bytes, Some(aad))?;
    Ok((request, response))
}

// ============================================================================
// DRAINER
// ============================================================================

/// Build the sink and spawn its background drainer. A missing cipher
/// yields a disabled sink and no drainer.
pub fn spawn_sink(
    cipher: Option<Arc<PayloadCipher>>,
    db: DbClient,
    config: TraceSinkConfig,
) -> (TraceSink, Option<JoinHandle<()>>) {
    let Some(cipher) = cipher else {
        tracing::warn!(
            "ENCRYPTION_MASTER_KEY is not set: trace recording is DISABLED. \
             Requests will succeed but no traces will be persisted."
        );
        return (TraceSink::disabled(), None);
    };

    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let sink = TraceSink::with_channel(cipher, tx);
    let dropped = sink.dropped.clone();
    let handle = tokio::spawn(run_drainer(db, rx, config, dropped));
    (sink, Some(handle))
}

async fn run_drainer(
    db: DbClient,
    mut rx: mpsc::Receiver<NewTrace>,
    config: TraceSinkConfig,
    dropped: Arc<AtomicU64>,
) {
    let mut pending: VecDeque<NewTrace> = VecDeque::new();
    let mut interval = tokio::time::interval(config.flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(row) => {
                        pending.push_back(row);
                        if pending.len() >= config.flush_batch {
                            flush(&db, &mut pending, &config, &dropped).await;
                        }
                    }
                    // All senders gone: final drain and exit.
                    None => break,
                }
            }
            _ = interval.tick() => {
                flush(&db, &mut pending, &config, &dropped).await;
            }
        }
    }

    flush(&db, &mut pending, &config, &dropped).await;
    if !pending.is_empty() {
        dropped.fetch_add(pending.len() as u64, Ordering::Relaxed);
        tracing::warn!(count = pending.len(), "trace drainer exiting with unflushed rows");
    }
}

async fn flush(
    db: &DbClient,
    pending: &mut VecDeque<NewTrace>,
    config: &TraceSinkConfig,
    dropped: &AtomicU64,
) {
    while !pending.is_empty() {
        let batch: Vec<NewTrace> = pending
            .iter()
            .take(config.flush_batch)
            .cloned()
            .collect();
        match db.trace_insert_batch(&batch).await {
            Ok(()) => {
                pending.drain(..batch.len());
            }
            Err(e) => {
                tracing::warn!(error = %e, rows = pending.len(), "trace flush failed; will retry");
                // Drop-oldest keeps the retry buffer bounded.
                while pending.len() > config.queue_capacity {
                    pending.pop_front();
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_cipher() -> Arc<PayloadCipher> {
        Arc::new(PayloadCipher::from_hex_key(&"cd".repeat(32)).expect("valid key"))
    }

    fn test_event(tenant_id: TenantId) -> TraceEvent {
        TraceEvent {
            tenant_id,
            agent_id: Some(AgentId::generate()),
            model: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            request: json!({"messages": [{"role": "user", "content": "ping"}]}),
            response: json!({"choices": [{"message": {"content": "pong"}}]}),
            status_code: 200,
            latency_ms: 42,
            usage: Some(Usage {
                prompt_tokens: Some(3),
                completion_tokens: Some(2),
                total_tokens: Some(5),
            }),
            ttfb_ms: Some(12),
            gateway_overhead_ms: Some(1),
        }
    }

    #[tokio::test]
    async fn test_record_encrypts_under_tenant_aad() {
        let cipher = test_cipher();
        let (tx, mut rx) = mpsc::channel(8);
        let sink = TraceSink::with_channel(cipher.clone(), tx);
        let tenant_id = TenantId::generate();

        sink.record(test_event(tenant_id));
        let row = rx.recv().await.expect("row enqueued");

        assert_eq!(row.tenant_id, tenant_id);
        assert_eq!(row.status_code, 200);
        assert_eq!(row.total_tokens, Some(5));

        let aad = tenant_id.to_string();
        let request = cipher
            .decrypt_string(&row.request, Some(aad.as_bytes()))
            .expect("decrypts under own tenant");
        assert!(request.contains("ping"));

        // A different tenant id cannot open the payload
        let other = TenantId::generate().to_string();
        assert!(cipher.decrypt(&row.request, Some(other.as_bytes())).is_err());
    }

    #[tokio::test]
    async fn test_disabled_sink_is_noop() {
        let sink = TraceSink::disabled();
        sink.record(test_event(TenantId::generate()));
        assert!(!sink.is_enabled());
        assert_eq!(sink.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_counts_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = TraceSink::with_channel(test_cipher(), tx);
        let tenant_id = TenantId::generate();

        sink.record(test_event(tenant_id)); // fills the queue
        sink.record(test_event(tenant_id)); // dropped
        assert_eq!(sink.dropped_count(), 1);
    }
}
