//! API-key hashing and opaque token minting

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix carried by every raw data-plane key.
pub const API_KEY_PREFIX: &str = "loom_sk_";

/// Length of the stored display prefix.
pub const KEY_PREFIX_LEN: usize = 12;

/// Hash a raw API key for lookup. Deterministic 64-char lowercase hex.
pub fn key_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Mint a fresh raw API key: `loom_sk_` plus 43 chars of URL-safe random.
/// The raw value is only ever shown once, at creation time.
pub fn mint_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("{}{}", API_KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

/// The stored display prefix of a raw key: its first 12 characters.
pub fn key_prefix(raw: &str) -> String {
    raw.chars().take(KEY_PREFIX_LEN).collect()
}

/// Mint an opaque invite token.
pub fn mint_invite_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Mint an external id for auto-materialised conversations.
pub fn mint_external_id() -> String {
    uuid_like(&mut rand::rng())
}

fn uuid_like(rng: &mut impl RngCore) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&bytes[0..4]),
        hex::encode(&bytes[4..6]),
        hex::encode(&bytes[6..8]),
        hex::encode(&bytes[8..10]),
        hex::encode(&bytes[10..16]),
    )
}
