//! PBKDF2 key derivation for PIN-based vault keys.
//!
//! This module provides:
//! - [`derive_key`] — derive a 256-bit key from a PIN + salt via PBKDF2-HMAC-SHA256
//! - [`Salt`] — 128-bit per-account random salt with a stable hex string form
//! - [`DerivedKey`] — zeroizing key wrapper with a stable hex string form
//!
//! # Determinism
//!
//! The derivation is a pure function of `(PIN, salt)`: the same pair always
//! reproduces the same key, which is what makes re-login on a new device
//! possible without the key ever being stored server-side. The PIN itself
//! must never be persisted anywhere — only the salt travels.

use crate::error::CryptoError;
use data_encoding::HEXLOWER;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Output length of the KDF in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Salt length in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count.
///
/// Fixed for all accounts — changing it would silently derive a different
/// key from the same `(PIN, salt)` pair and lock every existing vault out.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

// ---------------------------------------------------------------------------
// Salt
// ---------------------------------------------------------------------------

/// A 128-bit random salt, generated once per account at profile creation.
///
/// The stable string form is lowercase hex (32 characters). The salt is not
/// secret by itself — it is persisted next to the account record — but it is
/// required to re-derive the key from a fresh PIN entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt {
    bytes: [u8; SALT_LEN],
}

impl Salt {
    /// Generate a fresh random salt from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Stable string form: lowercase hex.
    #[must_use]
    pub fn encode(&self) -> String {
        HEXLOWER.encode(&self.bytes)
    }

    /// Parse the stable hex form back into a salt.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyDerivation` if the input is not 32 lowercase
    /// hex characters.
    pub fn decode(s: &str) -> Result<Self, CryptoError> {
        let decoded = HEXLOWER
            .decode(s.as_bytes())
            .map_err(|e| CryptoError::KeyDerivation(format!("invalid salt encoding: {e}")))?;
        let bytes: [u8; SALT_LEN] = decoded.try_into().map_err(|_| {
            CryptoError::KeyDerivation(format!(
                "invalid salt length: expected {SALT_LEN} bytes"
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Raw salt bytes for the KDF.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.bytes
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ---------------------------------------------------------------------------
// DerivedKey
// ---------------------------------------------------------------------------

/// A 256-bit symmetric key derived from `(PIN, salt)`.
///
/// The raw bytes are zeroized on drop and masked in `Debug`/`Display`.
/// The stable string form (lowercase hex) is what crosses into the storage
/// tiers — parse it back with [`DerivedKey::decode`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Wrap raw key bytes. The caller should zeroize its copy afterwards.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Expose the raw key bytes for a cryptographic operation.
    #[must_use]
    pub const fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Stable string form: lowercase hex (64 characters).
    #[must_use]
    pub fn encode(&self) -> String {
        HEXLOWER.encode(&self.bytes)
    }

    /// Parse the stable hex form back into a key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` if the input is not 64
    /// lowercase hex characters.
    pub fn decode(s: &str) -> Result<Self, CryptoError> {
        let mut decoded = HEXLOWER
            .decode(s.as_bytes())
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("invalid key encoding: {e}")))?;
        if decoded.len() != KEY_LEN {
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "invalid key length: {} bytes (expected {KEY_LEN})",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        let key = Self { bytes };
        bytes.zeroize();
        Ok(key)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

// ---------------------------------------------------------------------------
// Core KDF
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from a PIN and a per-account salt.
///
/// PBKDF2-HMAC-SHA256 with [`PBKDF2_ITERATIONS`] rounds. Deterministic and
/// CPU-bound (tens of milliseconds): callers on an interactive thread should
/// offload this call to a worker rather than block the UI.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if the PIN is empty. A salt is
/// well-formed by construction ([`Salt::decode`] rejects malformed input).
pub fn derive_key(pin: &str, salt: &Salt) -> Result<DerivedKey, CryptoError> {
    if pin.is_empty() {
        return Err(CryptoError::KeyDerivation("PIN must not be empty".into()));
    }

    let mut output = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(
        pin.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut output,
    );

    let key = DerivedKey::from_bytes(output);
    output.zeroize();
    Ok(key)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
