//! SSE chunk accumulation
//!
//! Buffers raw upstream bytes, splits complete `data:` lines and
//! accumulates the assistant text from `choices[0].delta.content`.
//! Malformed lines are ignored. The gateway's tee feeds this while piping
//! the same bytes verbatim to the client.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<crate::types::Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental parser over an SSE byte stream.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    buffer: String,
    content: String,
    finish_reason: Option<String>,
    usage: Option<crate::types::Usage>,
    bytes_seen: u64,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw chunk of upstream bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.bytes_seen += chunk.len() as u64;
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        // Process complete lines; a trailing partial line stays buffered.
        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim().to_string();
            self.buffer.drain(..=line_end);
            self.consume_line(&line);
        }
    }

    fn consume_line(&mut self, line: &str) {
        if line.is_empty() || line == "data: [DONE]" {
            return;
        }
        let Some(json_str) = line.strip_prefix("data: ") else {
            return;
        };
        let Ok(chunk) = serde_json::from_str::<StreamChunk>(json_str) else {
            // Malformed SSE payloads are ignored by design.
            return;
        };
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = choice.delta.as_ref().and_then(|d| d.content.as_deref()) {
                self.content.push_str(content);
            }
            if let Some(reason) = &choice.finish_reason {
                self.finish_reason = Some(reason.clone());
            }
        }
    }

    /// The assistant text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Finish reason from the final chunk, when one was seen.
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Usage block, when the upstream included one in the stream.
    pub fn usage(&self) -> Option<crate::types::Usage> {
        self.usage
    }

    /// Total raw bytes fed, for partial-trace accounting.
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Synthesise a response-like JSON object for the trace recorder,
    /// mirroring the non-streaming completion shape.
    pub fn into_response_value(self, model: &str) -> serde_json::Value {
        serde_json::json!({
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": self.content},
                "finish_reason": self.finish_reason,
            }],
            "usage": self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(acc: &mut SseAccumulator, payload: &str) {
        acc.feed(payload.as_bytes());
    }

    #[test]
    fn test_accumulates_delta_content() {
        let mut acc = SseAccumulator::new();
        feed_all(
            &mut acc,
            "data: {\"choices\":[{\"delta\":{\"content\":\"HEL\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"LO\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n\
             data: [DONE]\n\n",
        );
        assert_eq!(acc.content(), "HELLO");
        assert_eq!(acc.finish_reason(), Some("stop"));
    }

    #[test]
    fn test_handles_split_chunks() {
        let mut acc = SseAccumulator::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"split\"}}]}\n";
        acc.feed(&line.as_bytes()[..17]);
        assert_eq!(acc.content(), "");
        acc.feed(&line.as_bytes()[17..]);
        assert_eq!(acc.content(), "split");
    }

    #[test]
    fn test_ignores_malformed_lines() {
        let mut acc = SseAccumulator::new();
        feed_all(
            &mut acc,
            "data: {not json}\n\
             : comment line\n\
             event: ping\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        assert_eq!(acc.content(), "ok");
    }

    #[test]
    fn test_captures_usage() {
        let mut acc = SseAccumulator::new();
        feed_all(
            &mut acc,
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4,\"total_tokens\":7}}\n",
        );
        let usage = acc.usage().expect("usage");
        assert_eq!(usage.total_tokens, Some(7));
    }

    #[test]
    fn test_bytes_seen_counts_raw_input() {
        let mut acc = SseAccumulator::new();
        acc.feed(b"data: [DONE]\n");
        assert_eq!(acc.bytes_seen(), 13);
    }

    #[test]
    fn test_synthesised_response_shape() {
        let mut acc = SseAccumulator::new();
        feed_all(
            &mut acc,
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":null}]}\n\
             data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
        );
        let value = acc.into_response_value("gpt-4o");
        assert_eq!(value["choices"][0]["message"]["content"], "hi");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["model"], "gpt-4o");
    }
}
