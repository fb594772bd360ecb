//! Entity identifiers
//!
//! Opaque UUID newtypes, one per entity, so an id for one entity cannot
//! be passed where another is expected. Fresh ids are UUIDv7: they sort
//! by creation time, which keeps primary keys insertion-ordered and lets
//! the trace cursor paginate on the id alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error for id strings that do not parse as UUIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub entity: &'static str,
    pub input: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid {} id", self.input, self.entity)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! entity_id {
    ($name:ident, $entity:literal) => {
        #[doc = concat!("Identifier of a ", $entity, ".")]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh, time-ordered id.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// The all-zero id.
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self).map_err(|_| ParseIdError {
                    entity: $entity,
                    input: s.to_string(),
                })
            }
        }
    };
}

entity_id!(TenantId, "tenant");
entity_id!(AgentId, "agent");
entity_id!(UserId, "user");
entity_id!(MembershipId, "tenant membership");
entity_id!(InviteId, "invite");
entity_id!(ApiKeyId, "api key");
entity_id!(PartitionId, "partition");
entity_id!(ConversationId, "conversation");
entity_id!(MessageId, "conversation message");
entity_id!(SnapshotId, "conversation snapshot");
entity_id!(TraceId, "trace");
