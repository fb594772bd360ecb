//! Enumerations shared across the Loom crates

use serde::{Deserialize, Serialize};

// ============================================================================
// TENANT / MEMBERSHIP ENUMS
// ============================================================================

/// Lifecycle status of a tenant. Only active tenants participate in the
/// data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
}

impl TenantStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            _ => Err(EnumParseError::new("tenant status", s)),
        }
    }
}

/// Role of a user within a tenant.
///
/// Authorisation only distinguishes owners from everyone else; roles this
/// code does not know about are treated as `Member`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Owner,
    Member,
}

impl TenantRole {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }

    /// Parse from a stored or claimed role string. Unknown roles fold into
    /// `Member` rather than failing authorisation outright.
    pub fn from_claim(s: &str) -> Self {
        match s {
            "owner" => Self::Owner,
            _ => Self::Member,
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }
}

// ============================================================================
// API KEY ENUMS
// ============================================================================

/// Lifecycle status of an API key. Revoked keys never authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
}

impl ApiKeyStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            _ => Err(EnumParseError::new("api key status", s)),
        }
    }
}

// ============================================================================
// CONVERSATION ENUMS
// ============================================================================

/// Role of a stored conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(EnumParseError::new("message role", s)),
        }
    }

    /// Wire-format role string for chat-completions messages.
    pub fn as_wire_str(&self) -> &'static str {
        self.as_db_str()
    }
}

// ============================================================================
// MERGE POLICY ENUMS
// ============================================================================

/// How an agent's system prompt is folded into the caller-supplied body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptPolicy {
    /// Place the agent's system message before any caller system message.
    #[default]
    Prepend,
    /// Place the agent's system message after the caller's messages.
    Append,
    /// Replace every caller system message with the agent's.
    Overwrite,
    /// Leave the caller's body untouched.
    Ignore,
}

impl PromptPolicy {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Prepend => "prepend",
            Self::Append => "append",
            Self::Overwrite => "overwrite",
            Self::Ignore => "ignore",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "prepend" => Ok(Self::Prepend),
            "append" => Ok(Self::Append),
            "overwrite" => Ok(Self::Overwrite),
            "ignore" => Ok(Self::Ignore),
            _ => Err(EnumParseError::new("prompt policy", s)),
        }
    }
}

/// How agent-level skills or MCP endpoints combine with caller-supplied
/// entries. `Merge` forms a set-union keyed by name; the agent-supplied
/// entry wins on collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListMergePolicy {
    #[default]
    Merge,
    Overwrite,
    Ignore,
}

impl ListMergePolicy {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Overwrite => "overwrite",
            Self::Ignore => "ignore",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "merge" => Ok(Self::Merge),
            "overwrite" => Ok(Self::Overwrite),
            "ignore" => Ok(Self::Ignore),
            _ => Err(EnumParseError::new("list merge policy", s)),
        }
    }
}

// ============================================================================
// PARSE ERROR
// ============================================================================

/// Error parsing an enum from its stored string representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub input: String,
}

impl EnumParseError {
    pub fn new(kind: &'static str, input: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
        }
    }
}

impl std::fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.input)
    }
}

impl std::error::Error for EnumParseError {}
