//! Error types for Loom operations

use crate::TenantId;
use thiserror::Error;

/// Cryptographic primitive errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Stored password hash is not in salt:derived format")]
    InvalidHashFormat,

    #[error("Key derivation failed: {reason}")]
    DerivationFailed { reason: String },

    #[error("Master key must be a 64-char hex string, got {length} chars")]
    InvalidMasterKey { length: usize },

    #[error("Decryption failed: ciphertext or associated data does not match")]
    DecryptionFailed,

    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },
}

/// Configuration-resolution errors surfaced by the inheritance walk.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigResolveError {
    #[error("Tenant {tenant_id} not found while walking inheritance chain")]
    TenantNotFound { tenant_id: TenantId },

    #[error("Tenant {tenant_id} is suspended")]
    TenantSuspended { tenant_id: TenantId },

    #[error("Provider misconfigured: {reason}")]
    ProviderMisconfigured { reason: String },

    #[error("Cycle detected in tenant parent chain at {tenant_id}")]
    ParentCycle { tenant_id: TenantId },
}

/// Master error type for domain failures shared across crates.
#[derive(Debug, Clone, Error)]
pub enum LoomError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigResolveError),
}

/// Result type alias for domain operations.
pub type LoomResult<T> = Result<T, LoomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CryptoError::InvalidMasterKey { length: 12 };
        assert!(err.to_string().contains("64-char hex"));

        let err = ConfigResolveError::TenantSuspended {
            tenant_id: TenantId::nil(),
        };
        assert!(err.to_string().contains("suspended"));
    }

    #[test]
    fn test_error_conversion() {
        let err: LoomError = CryptoError::DecryptionFailed.into();
        assert!(matches!(err, LoomError::Crypto(_)));
    }
}
