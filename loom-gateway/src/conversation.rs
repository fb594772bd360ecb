//! Conversation Manager
//!
//! Partition and conversation lifecycle, encrypted message append,
//! snapshotting, and context reconstruction with "active snapshot +
//! subsequent messages" semantics. Stateless beyond the database; message
//! content is sealed per tenant with AES-256-GCM.
//!
//! Persistence here is a side path: `spawn_store_messages` is
//! fire-and-forget and never blocks or fails the response.

use crate::db::DbClient;
use crate::error::ApiResult;
use loom_core::{
    estimate_tokens, ContextMessage, Conversation, ConversationContext, ConversationSnapshot,
    MessageRole, Partition, PartitionId, SnapshotId, TenantId,
};
use loom_crypto::PayloadCipher;
use serde_json::{json, Value};
use std::sync::Arc;

/// Conversation lifecycle and context reconstruction.
#[derive(Clone)]
pub struct ConversationManager {
    db: DbClient,
    cipher: Option<Arc<PayloadCipher>>,
}

impl ConversationManager {
    pub fn new(db: DbClient, cipher: Option<Arc<PayloadCipher>>) -> Self {
        Self { db, cipher }
    }

    /// Conversations need the master key; without it persistence is
    /// disabled and the pipeline skips the conversation branch.
    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Idempotent partition materialisation on (tenant, external id).
    pub async fn get_or_create_partition(
        &self,
        tenant_id: TenantId,
        external_id: &str,
        parent: Option<PartitionId>,
        title: Option<&str>,
    ) -> ApiResult<Partition> {
        self.db
            .partition_get_or_create(tenant_id, external_id, parent, title)
            .await
    }

    /// Idempotent conversation materialisation on (tenant, external id).
    pub async fn get_or_create_conversation(
        &self,
        tenant_id: TenantId,
        external_id: &str,
        agent_id: Option<loom_core::AgentId>,
        partition_id: Option<PartitionId>,
    ) -> ApiResult<Conversation> {
        self.db
            .conversation_get_or_create(tenant_id, external_id, agent_id, partition_id)
            .await
    }

    /// Reconstruct a conversation's context: the newest snapshot (if any)
    /// plus every message appended after it. The token estimate sums
    /// per-message estimates and the snapshot's own estimate.
    pub async fn load_context(&self, conversation: &Conversation) -> ApiResult<ConversationContext> {
        let Some(cipher) = &self.cipher else {
            return Ok(ConversationContext::default());
        };
        let aad = conversation.tenant_id.to_string();

        let snapshot = self.db.snapshot_latest(conversation.conversation_id).await?;
        let (snapshot_id, snapshot_summary, after) = match &snapshot {
            Some(snapshot) => {
                let summary = cipher
                    .decrypt_string(&snapshot.summary, Some(aad.as_bytes()))
                    .map_err(|e| {
                        tracing::warn!(
                            conversation_id = %conversation.conversation_id,
                            error = %e,
                            "failed to decrypt snapshot summary"
                        );
                        e
                    })
                    .ok();
                (Some(snapshot.snapshot_id), summary, Some(snapshot.created_at))
            }
            None => (None, None, None),
        };

        let rows = self
            .db
            .messages_after(conversation.conversation_id, after)
            .await?;

        let mut messages = Vec::with_capacity(rows.len());
        let mut token_estimate = 0i32;
        for row in rows {
            match cipher.decrypt_string(&row.content, Some(aad.as_bytes())) {
                Ok(content) => {
                    // Explicit estimates on the row take priority.
                    let tokens = if row.token_estimate > 0 {
                        row.token_estimate
                    } else {
                        estimate_tokens(&content)
                    };
                    token_estimate = token_estimate.saturating_add(tokens);
                    messages.push(ContextMessage {
                        role: row.role,
                        content,
                        tokens,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %row.message_id,
                        error = %e,
                        "skipping undecryptable conversation message"
                    );
                }
            }
        }

        if let Some(summary) = &snapshot_summary {
            token_estimate = token_estimate.saturating_add(estimate_tokens(summary));
        }

        Ok(ConversationContext {
            messages,
            token_estimate,
            snapshot_id,
            snapshot_summary,
        })
    }

    /// The messages to prepend to the caller's `messages`: a synthetic
    /// system message carrying the snapshot summary (when one exists),
    /// then the post-snapshot turns in order with roles preserved.
    pub fn build_injection_messages(context: &ConversationContext) -> Vec<Value> {
        let mut injected = Vec::with_capacity(context.messages.len() + 1);
        if let Some(summary) = &context.snapshot_summary {
            injected.push(json!({"role": "system", "content": summary}));
        }
        for message in &context.messages {
            injected.push(json!({
                "role": message.role.as_wire_str(),
                "content": message.content,
            }));
        }
        injected
    }

    /// Append the completed turn as two encrypted rows and refresh
    /// `last_active_at`.
    pub async fn store_messages(
        &self,
        conversation: &Conversation,
        user_text: &str,
        assistant_text: &str,
        user_tokens: Option<i32>,
        assistant_tokens: Option<i32>,
    ) -> ApiResult<()> {
        let Some(cipher) = &self.cipher else {
            return Ok(());
        };
        let aad = conversation.tenant_id.to_string();

        let user_blob = cipher.encrypt(user_text.as_bytes(), Some(aad.as_bytes()))?;
        let assistant_blob = cipher.encrypt(assistant_text.as_bytes(), Some(aad.as_bytes()))?;

        self.db
            .message_append(
                conversation.conversation_id,
                MessageRole::User,
                &user_blob,
                user_tokens.unwrap_or_else(|| estimate_tokens(user_text)),
            )
            .await?;
        self.db
            .message_append(
                conversation.conversation_id,
                MessageRole::Assistant,
                &assistant_blob,
                assistant_tokens.unwrap_or_else(|| estimate_tokens(assistant_text)),
            )
            .await?;
        self.db.conversation_touch(conversation.conversation_id).await?;
        Ok(())
    }

    /// Fire-and-forget persistence of a completed turn. Failures are
    /// logged and swallowed so they never affect the response path.
    pub fn spawn_store_messages(
        &self,
        conversation: Conversation,
        user_text: String,
        assistant_text: String,
        user_tokens: Option<i32>,
        assistant_tokens: Option<i32>,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager
                .store_messages(
                    &conversation,
                    &user_text,
                    &assistant_text,
                    user_tokens,
                    assistant_tokens,
                )
                .await
            {
                tracing::warn!(
                    conversation_id = %conversation.conversation_id,
                    error = %e,
                    "failed to persist conversation turn"
                );
            }
        });
    }

    /// Create a snapshot from a summariser result. Serialised per
    /// conversation; returns `None` when a concurrent request already
    /// snapshotted past `based_on`.
    pub async fn create_snapshot(
        &self,
        conversation: &Conversation,
        summary: &str,
        messages_archived: i32,
        based_on: Option<SnapshotId>,
    ) -> ApiResult<Option<ConversationSnapshot>> {
        let Some(cipher) = &self.cipher else {
            return Ok(None);
        };
        let aad = conversation.tenant_id.to_string();
        let blob = cipher.encrypt(summary.as_bytes(), Some(aad.as_bytes()))?;
        self.db
            .snapshot_create_guarded(
                conversation.conversation_id,
                based_on,
                &blob,
                messages_archived,
            )
            .await
    }

    /// Decrypted messages of a conversation, for the portal read surface.
    pub async fn read_messages(
        &self,
        conversation: &Conversation,
    ) -> ApiResult<Vec<ContextMessage>> {
        let Some(cipher) = &self.cipher else {
            return Ok(Vec::new());
        };
        let aad = conversation.tenant_id.to_string();
        let rows = self
            .db
            .messages_after(conversation.conversation_id, None)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                cipher
                    .decrypt_string(&row.content, Some(aad.as_bytes()))
                    .ok()
                    .map(|content| ContextMessage {
                        role: row.role,
                        tokens: row.token_estimate,
                        content,
                    })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injection_starts_with_snapshot_summary() {
        let context = ConversationContext {
            messages: vec![
                ContextMessage {
                    role: MessageRole::User,
                    content: "first".to_string(),
                    tokens: 2,
                },
                ContextMessage {
                    role: MessageRole::Assistant,
                    content: "second".to_string(),
                    tokens: 2,
                },
            ],
            token_estimate: 4,
            snapshot_id: Some(SnapshotId::generate()),
            snapshot_summary: Some("the story so far".to_string()),
        };

        let injected = ConversationManager::build_injection_messages(&context);
        assert_eq!(injected.len(), 3);
        assert_eq!(injected[0]["role"], "system");
        assert_eq!(injected[0]["content"], "the story so far");
        assert_eq!(injected[1]["role"], "user");
        assert_eq!(injected[2]["role"], "assistant");
    }

    #[test]
    fn test_injection_without_snapshot() {
        let context = ConversationContext {
            messages: vec![ContextMessage {
                role: MessageRole::User,
                content: "hello".to_string(),
                tokens: 2,
            }],
            token_estimate: 2,
            snapshot_id: None,
            snapshot_summary: None,
        };
        let injected = ConversationManager::build_injection_messages(&context);
        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0]["role"], "user");
    }
}
