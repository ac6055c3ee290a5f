//! AES-256-GCM authenticated encryption with self-contained string tokens.
//!
//! This module provides:
//! - [`encrypt`] — encrypt plaintext with a random nonce, returning a [`CipherToken`]
//! - [`decrypt`] — decrypt and authenticate a [`CipherToken`], returning a [`SecretBuffer`]
//! - [`CipherToken`] — nonce + ciphertext + tag container with a base64url string form
//!
//! The token is self-contained: everything needed to decrypt (except the key)
//! travels inside it, so it can be stored as an opaque string by the remote
//! record store and the offline cache. Two failure modes are kept distinct:
//! a token that cannot be parsed yields [`CryptoError::MalformedToken`], while
//! a parseable token that fails authentication (wrong key, tampering) yields
//! [`CryptoError::Decryption`]. A valid empty payload round-trips as `Ok`.

use crate::error::CryptoError;
use crate::kdf::DerivedKey;
use crate::memory::SecretBuffer;
use data_encoding::BASE64URL_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Minimum valid serialized length: nonce + empty ciphertext + tag.
const MIN_TOKEN_LEN: usize = NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Authenticated ciphertext container — nonce + ciphertext + tag.
///
/// Byte layout: `nonce (12 bytes) || ciphertext (variable) || tag (16 bytes)`.
/// The string form is the unpadded base64url encoding of that layout.
///
/// The nonce is randomly generated per encryption call and must travel with
/// the ciphertext for decryption. The tag provides authentication — any
/// modification to the nonce, ciphertext, or tag will cause decryption to fail.
#[must_use = "encrypted data must be stored or transmitted"]
#[derive(Clone, Debug)]
pub struct CipherToken {
    /// 96-bit random nonce, unique per encryption.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted data (same length as original plaintext).
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl CipherToken {
    /// Serialize to the byte layout: `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = NONCE_LEN
            .saturating_add(self.ciphertext.len())
            .saturating_add(TAG_LEN);
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Deserialize from the byte layout: `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedToken` if the input is shorter than
    /// 28 bytes (12-byte nonce + 0-byte ciphertext + 16-byte tag).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_TOKEN_LEN {
            return Err(CryptoError::MalformedToken(format!(
                "token too short: {} bytes (minimum {MIN_TOKEN_LEN})",
                bytes.len()
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);

        // The length guard above guarantees bytes.len() >= NONCE_LEN + TAG_LEN;
        // checked_sub satisfies the workspace arithmetic_side_effects lint.
        let ct_len = bytes
            .len()
            .checked_sub(NONCE_LEN.saturating_add(TAG_LEN))
            .ok_or_else(|| CryptoError::MalformedToken("token length underflow".into()))?;

        let ct_start = NONCE_LEN;
        let ct_end = ct_start.saturating_add(ct_len);
        let ciphertext = bytes[ct_start..ct_end].to_vec();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[ct_end..]);

        Ok(Self {
            nonce,
            ciphertext,
            tag,
        })
    }

    /// Stable string form: unpadded base64url of [`Self::to_bytes`].
    #[must_use]
    pub fn encode(&self) -> String {
        BASE64URL_NOPAD.encode(&self.to_bytes())
    }

    /// Parse the stable string form back into a token.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedToken` on invalid base64url or a
    /// too-short payload.
    pub fn decode(s: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64URL_NOPAD
            .decode(s.as_bytes())
            .map_err(|e| CryptoError::MalformedToken(format!("invalid token encoding: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Core encryption
// ---------------------------------------------------------------------------

/// Encrypt plaintext using AES-256-GCM with a random 96-bit nonce.
///
/// Returns a [`CipherToken`] containing the nonce, ciphertext, and
/// authentication tag. The nonce is generated from `OsRng` (CSPRNG) and is
/// unique per call, so encrypting the same plaintext twice yields different
/// tokens.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the underlying AEAD operation fails.
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<CipherToken, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.expose())
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let less_safe_key = aead::LessSafeKey::new(unbound);

    // Generate random 96-bit nonce.
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Encrypt in place — plaintext buffer becomes ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) =
        less_safe_key.seal_in_place_separate_tag(nonce, aead::Aad::empty(), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(CipherToken {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Decrypt an AES-256-GCM [`CipherToken`].
///
/// Returns the plaintext as a [`SecretBuffer`] (zeroized on drop). The
/// intermediate decryption buffer is zeroized after copying into the
/// `SecretBuffer`.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` if authentication fails — the key is
/// wrong or the token was tampered with. This failure is loud by design:
/// a wrong key must never produce garbage that is treated as valid data.
pub fn decrypt(token: &CipherToken, key: &DerivedKey) -> Result<SecretBuffer, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.expose())
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let less_safe_key = aead::LessSafeKey::new(unbound);

    let nonce = aead::Nonce::assume_unique_for_key(token.nonce);

    // Build ciphertext || tag buffer for open_in_place.
    let mut ct_tag = Vec::with_capacity(token.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&token.ciphertext);
    ct_tag.extend_from_slice(&token.tag);

    let plaintext_slice = less_safe_key
        .open_in_place(nonce, aead::Aad::empty(), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext_slice);
    ct_tag.zeroize();
    Ok(result)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KEY_LEN;

    /// Fixed test key — 32 bytes of 0xAA.
    fn test_key() -> DerivedKey {
        DerivedKey::from_bytes([0xAA; KEY_LEN])
    }

    /// Different key for wrong-key tests.
    fn wrong_key() -> DerivedKey {
        DerivedKey::from_bytes([0xBB; KEY_LEN])
    }

    #[test]
    fn encrypt_produces_correct_lengths() {
        let plaintext = b"hello, CLASP!";
        let token = encrypt(plaintext, &test_key()).expect("encrypt should succeed");
        assert_eq!(token.nonce.len(), NONCE_LEN);
        assert_eq!(token.tag.len(), TAG_LEN);
        assert_eq!(token.ciphertext.len(), plaintext.len());
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let plaintext = b"secret vault data";
        let token = encrypt(plaintext, &test_key()).expect("encrypt should succeed");
        let decrypted = decrypt(&token, &test_key()).expect("decrypt should succeed");
        assert_eq!(decrypted.expose(), plaintext);
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let token = encrypt(b"test data", &test_key()).expect("encrypt should succeed");
        let result = decrypt(&token, &wrong_key());
        assert!(
            matches!(result, Err(CryptoError::Decryption)),
            "wrong key should yield CryptoError::Decryption"
        );
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let mut tampered = encrypt(b"test data", &test_key()).expect("encrypt should succeed");
        if let Some(byte) = tampered.ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        let result = decrypt(&tampered, &test_key());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypt_fails_on_tampered_tag() {
        let mut tampered = encrypt(b"test data", &test_key()).expect("encrypt should succeed");
        tampered.tag[0] ^= 0xFF;
        let result = decrypt(&tampered, &test_key());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypt_fails_with_modified_nonce() {
        let mut tampered = encrypt(b"test data", &test_key()).expect("encrypt should succeed");
        tampered.nonce[0] ^= 0xFF;
        let result = decrypt(&tampered, &test_key());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn encrypt_empty_plaintext_succeeds() {
        let token = encrypt(&[], &test_key()).expect("encrypt empty should succeed");
        assert!(token.ciphertext.is_empty());
        let decrypted = decrypt(&token, &test_key()).expect("decrypt empty should succeed");
        assert!(decrypted.expose().is_empty());
    }

    #[test]
    fn two_encrypts_produce_different_nonces() {
        let token_a = encrypt(b"same data", &test_key()).expect("encrypt should succeed");
        let token_b = encrypt(b"same data", &test_key()).expect("encrypt should succeed");
        assert_ne!(token_a.nonce, token_b.nonce, "nonces should differ");
    }

    #[test]
    fn token_string_roundtrip() {
        let token = encrypt(b"string form test", &test_key()).expect("encrypt should succeed");
        let encoded = token.encode();
        let restored = CipherToken::decode(&encoded).expect("decode should succeed");
        assert_eq!(token.nonce, restored.nonce);
        assert_eq!(token.ciphertext, restored.ciphertext);
        assert_eq!(token.tag, restored.tag);
        let decrypted = decrypt(&restored, &test_key()).expect("decrypt should succeed");
        assert_eq!(decrypted.expose(), b"string form test");
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let result = CipherToken::decode("not!valid!base64url!");
        assert!(matches!(result, Err(CryptoError::MalformedToken(_))));
    }

    #[test]
    fn decode_rejects_short_payload() {
        let short = BASE64URL_NOPAD.encode(&[0u8; 27]);
        let result = CipherToken::decode(&short);
        assert!(matches!(result, Err(CryptoError::MalformedToken(_))));
    }

    #[test]
    fn malformed_token_distinct_from_wrong_key() {
        // Parse failure and auth failure must be distinguishable.
        let parse_err = CipherToken::decode("@@@").expect_err("parse should fail");
        assert!(matches!(parse_err, CryptoError::MalformedToken(_)));

        let token = encrypt(b"x", &test_key()).expect("encrypt should succeed");
        let auth_err = decrypt(&token, &wrong_key()).expect_err("decrypt should fail");
        assert!(matches!(auth_err, CryptoError::Decryption));
    }
}
