//! Conversation context types and token estimation

use crate::{MessageRole, SnapshotId};
use serde::{Deserialize, Serialize};

/// Estimate the token count of a raw text.
///
/// `ceil(len / 4)` is coarse and deliberately pessimistic; rows that carry
/// an explicit estimate take priority over this.
pub fn estimate_tokens(text: &str) -> i32 {
    (text.len().div_ceil(4)).min(i32::MAX as usize) as i32
}

/// One decrypted message inside a reconstructed context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: MessageRole,
    pub content: String,
    pub tokens: i32,
}

/// A conversation's reconstructed context: the active snapshot (if any)
/// plus every message appended after it, oldest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub messages: Vec<ContextMessage>,
    pub token_estimate: i32,
    pub snapshot_id: Option<SnapshotId>,
    pub snapshot_summary: Option<String>,
}

impl ConversationContext {
    /// Whether the context has outgrown the agent's token budget and the
    /// next request should summarise before composing.
    pub fn needs_snapshot(&self, limit: i32) -> bool {
        self.token_estimate > limit
    }

    /// Render the prior transcript as plain text for the summariser prompt.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        if let Some(summary) = &self.snapshot_summary {
            out.push_str("Summary of earlier conversation:\n");
            out.push_str(summary);
            out.push_str("\n\n");
        }
        for message in &self.messages {
            out.push_str(message.role.as_wire_str());
            out.push_str(": ");
            out.push_str(&message.content);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_needs_snapshot_strict_inequality() {
        let context = ConversationContext {
            token_estimate: 100,
            ..Default::default()
        };
        assert!(!context.needs_snapshot(100));
        assert!(context.needs_snapshot(99));
    }

    #[test]
    fn test_transcript_includes_snapshot_and_turns() {
        let context = ConversationContext {
            messages: vec![
                ContextMessage {
                    role: MessageRole::User,
                    content: "hi".to_string(),
                    tokens: 1,
                },
                ContextMessage {
                    role: MessageRole::Assistant,
                    content: "hello".to_string(),
                    tokens: 2,
                },
            ],
            token_estimate: 3,
            snapshot_id: Some(SnapshotId::generate()),
            snapshot_summary: Some("earlier chat".to_string()),
        };
        let transcript = context.transcript();
        assert!(transcript.starts_with("Summary of earlier conversation:\nearlier chat"));
        assert!(transcript.contains("user: hi"));
        assert!(transcript.contains("assistant: hello"));
    }
}
