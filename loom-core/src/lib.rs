//! Loom Core - Entity Types
//!
//! Pure data structures shared by every Loom crate. This crate contains
//! entity definitions, type-safe identifiers, the configuration-inheritance
//! model, and the domain error enums - no I/O and no business logic.

// Core modules
mod config;
mod context;
mod entities;
mod enums;
mod error;
mod identity;

// Re-export identity types
pub use identity::*;

// Re-export all enums
pub use enums::*;

// Re-export entity structs
pub use entities::*;

// Re-export configuration-model types
pub use config::*;

// Re-export conversation-context types
pub use context::*;

// Re-export error types
pub use error::*;

/// Timestamp alias used by every entity.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
