//! Password hashing with scrypt
//!
//! Stored format is `hex(salt):hex(derived)` with a fresh 16-byte salt and
//! a 64-byte derived key. Verification re-derives under the stored salt and
//! compares in constant time.

use loom_core::CryptoError;
use rand::RngCore;
use scrypt::Params;
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const DERIVED_LEN: usize = 64;

/// scrypt cost parameters: N = 2^14, r = 8, p = 1.
fn params() -> Result<Params, CryptoError> {
    Params::new(14, 8, 1, DERIVED_LEN).map_err(|e| CryptoError::DerivationFailed {
        reason: e.to_string(),
    })
}

fn derive(password: &str, salt: &[u8]) -> Result<[u8; DERIVED_LEN], CryptoError> {
    let mut derived = [0u8; DERIVED_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &params()?, &mut derived).map_err(|e| {
        CryptoError::DerivationFailed {
            reason: e.to_string(),
        }
    })?;
    Ok(derived)
}

/// Hash a password into the `salt:derived` storage format.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let derived = derive(password, &salt)?;
    Ok(format!("{}:{}", hex::encode(salt), hex::encode(derived)))
}

/// Verify a password against a stored `salt:derived` hash.
///
/// # Errors
/// Returns `InvalidHashFormat` when the stored value does not parse as two
/// hex fields separated by a colon.
pub fn verify_password(stored: &str, password: &str) -> Result<bool, CryptoError> {
    let (salt_hex, derived_hex) = stored
        .split_once(':')
        .ok_or(CryptoError::InvalidHashFormat)?;

    let salt = hex::decode(salt_hex).map_err(|_| CryptoError::InvalidHashFormat)?;
    let expected = hex::decode(derived_hex).map_err(|_| CryptoError::InvalidHashFormat)?;
    if salt.len() != SALT_LEN || expected.len() != DERIVED_LEN {
        return Err(CryptoError::InvalidHashFormat);
    }

    let derived = derive(password, &salt)?;
    Ok(derived.ct_eq(&expected).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("pw-xyz-123").expect("hash");
        assert!(verify_password(&hash, "pw-xyz-123").expect("verify"));
        assert!(!verify_password(&hash, "pw-xyz-124").expect("verify"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same").expect("hash");
        let b = hash_password("same").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_format_rejected() {
        for stored in ["", "no-colon", "zz:zz", "abcd:abcd", ":"] {
            assert_eq!(
                verify_password(stored, "pw").expect_err("should reject"),
                CryptoError::InvalidHashFormat
            );
        }
    }

    proptest! {
        // Keep case count low: scrypt is deliberately slow.
        #![proptest_config(ProptestConfig::with_cases(4))]

        #[test]
        fn prop_verify_roundtrip(password in "[a-zA-Z0-9]{1,24}") {
            let hash = hash_password(&password).expect("hash");
            let wrong_password = format!("{}!", password);
            prop_assert!(verify_password(&hash, &password).expect("verify"));
            prop_assert!(!verify_password(&hash, &wrong_password).expect("verify"));
        }
    }
}
