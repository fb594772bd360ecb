//! Authenticated payload encryption
//!
//! AES-256-GCM under a process-wide master key with a fresh 12-byte IV per
//! payload. The associated data, when used, is the owning tenant id - a
//! ciphertext sealed for one tenant cannot be opened under another.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use loom_core::{CryptoError, EncryptedBlob};
use rand::RngCore;

const IV_LEN: usize = 12;
const KEY_HEX_LEN: usize = 64;

/// AES-256-GCM cipher bound to one master key.
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl PayloadCipher {
    /// Build a cipher from the 64-char hex master key.
    ///
    /// # Errors
    /// Returns `InvalidMasterKey` when the string is not 64 hex chars.
    pub fn from_hex_key(master_key: &str) -> Result<Self, CryptoError> {
        if master_key.len() != KEY_HEX_LEN {
            return Err(CryptoError::InvalidMasterKey {
                length: master_key.len(),
            });
        }
        let key_bytes = hex::decode(master_key).map_err(|_| CryptoError::InvalidMasterKey {
            length: master_key.len(),
        })?;
        let cipher =
            Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| CryptoError::InvalidMasterKey {
                length: master_key.len(),
            })?;
        Ok(Self { cipher })
    }

    /// Encrypt a payload with a fresh random IV.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<EncryptedBlob, CryptoError> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let payload = Payload {
            msg: plaintext,
            aad: associated_data.unwrap_or_default(),
        };
        let ciphertext =
            self.cipher
                .encrypt(nonce, payload)
                .map_err(|e| CryptoError::EncryptionFailed {
                    reason: e.to_string(),
                })?;

        Ok(EncryptedBlob {
            ciphertext,
            iv: iv.to_vec(),
        })
    }

    /// Decrypt a payload.
    ///
    /// # Errors
    /// Returns `DecryptionFailed` on tag mismatch - wrong key, tampered
    /// ciphertext, or mismatched associated data.
    pub fn decrypt(
        &self,
        blob: &EncryptedBlob,
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        if blob.iv.len() != IV_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let nonce = Nonce::from_slice(&blob.iv);
        let payload = Payload {
            msg: blob.ciphertext.as_slice(),
            aad: associated_data.unwrap_or_default(),
        };
        self.cipher
            .decrypt(nonce, payload)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Convenience wrapper for UTF-8 string payloads.
    pub fn decrypt_string(
        &self,
        blob: &EncryptedBlob,
        associated_data: Option<&[u8]>,
    ) -> Result<String, CryptoError> {
        let bytes = self.decrypt(blob, associated_data)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
