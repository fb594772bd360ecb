//! Loom Crypto - Cryptographic Primitives
//!
//! Three small, pure surfaces used across the gateway:
//! 1. Password hashing (scrypt, `salt:derived` storage format)
//! 2. API-key hashing and token minting (SHA-256 lookup index)
//! 3. Payload encryption (AES-256-GCM with tenant-scoped associated data)
//!
//! Nothing in this crate performs I/O; callers own key management and
//! storage.

mod cipher;
mod keys;
mod password;

pub use cipher::PayloadCipher;
pub use keys::{key_hash, key_prefix, mint_api_key, mint_invite_token, mint_external_id, API_KEY_PREFIX, KEY_PREFIX_LEN};
pub use password::{hash_password, verify_password};
