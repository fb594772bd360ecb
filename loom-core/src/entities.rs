//! Core entity structures

use crate::*;
use serde::{Deserialize, Serialize};

/// An encrypted payload as stored at rest: AES-256-GCM ciphertext plus the
/// 12-byte IV it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

/// Tenant - organisation-level identity and the root of configuration
/// inheritance. The parent link forms a rooted forest; cycle detection
/// happens at create time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: TenantId,
    pub name: String,
    pub parent_tenant_id: Option<TenantId>,
    pub status: TenantStatus,
    #[serde(flatten)]
    pub overrides: ConfigOverrides,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Agent - a named, reusable LLM configuration owned by exactly one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(flatten)]
    pub overrides: ConfigOverrides,
    pub merge_policies: MergePolicies,
    pub conversations_enabled: bool,
    pub conversation_token_limit: i32,
    pub conversation_summary_model: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Default token budget before a conversation is summarised.
pub const DEFAULT_CONVERSATION_TOKEN_LIMIT: i32 = 4000;

/// Portal user. Emails are stored lowercased and unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Membership of a user in a tenant. The (user, tenant) pair is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub membership_id: MembershipId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: TenantRole,
    pub joined_at: Timestamp,
}

/// Invite token for joining a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    pub invite_id: InviteId,
    pub tenant_id: TenantId,
    #[serde(skip_serializing)]
    pub token: String,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub expires_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub created_by: UserId,
    pub created_at: Timestamp,
}

impl Invite {
    /// An invite is valid iff it is not revoked, not expired, and has uses
    /// remaining. All three clauses must be checked before any user or
    /// membership is created.
    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.revoked_at.is_none()
            && now < self.expires_at
            && self.max_uses.is_none_or(|max| self.use_count < max)
    }
}

/// Data-plane credential for one agent. The raw key is never stored; the
/// SHA-256 hash is the lookup index and the 12-char prefix is for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub api_key_id: ApiKeyId,
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub status: ApiKeyStatus,
    pub revoked_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Partition - a caller-supplied grouping for conversations, forming a
/// tenant-local forest. Materialised on first reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub partition_id: PartitionId,
    pub tenant_id: TenantId,
    pub external_id: String,
    pub parent_partition_id: Option<PartitionId>,
    pub title: Option<String>,
    pub created_at: Timestamp,
}

/// Conversation - a tracked message history, materialised on first
/// reference when the agent has conversations enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: ConversationId,
    pub tenant_id: TenantId,
    pub agent_id: Option<AgentId>,
    pub partition_id: Option<PartitionId>,
    pub external_id: String,
    pub created_at: Timestamp,
    pub last_active_at: Timestamp,
}

/// One encrypted conversation turn. Insertion order is preserved by
/// `created_at`; `snapshot_id` links messages archived by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: EncryptedBlob,
    pub token_estimate: i32,
    pub snapshot_id: Option<SnapshotId>,
    pub created_at: Timestamp,
}

/// A compressed, encrypted summary of a conversation prefix. The newest
/// snapshot is the conversation's active snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub snapshot_id: SnapshotId,
    pub conversation_id: ConversationId,
    pub summary: EncryptedBlob,
    pub messages_archived: i32,
    pub created_at: Timestamp,
}

/// Append-only record of one proxied request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    pub tenant_id: TenantId,
    pub agent_id: Option<AgentId>,
    pub model: String,
    pub provider: String,
    pub request: EncryptedBlob,
    pub response: EncryptedBlob,
    pub status_code: i32,
    pub latency_ms: i64,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub ttfb_ms: Option<i64>,
    pub gateway_overhead_ms: Option<i64>,
    pub created_at: Timestamp,
}
