//! Cryptographic error types for `clasp-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation rejected its input (empty PIN, malformed salt).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM key setup or sealing).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed — ciphertext tampered or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Ciphertext token could not be parsed (bad encoding or truncated).
    #[error("malformed ciphertext token: {0}")]
    MalformedToken(String),

    /// Invalid key material (wrong length, corrupted encoding).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Password generation failure (invalid parameters).
    #[error("password generation error: {0}")]
    PasswordGeneration(String),

    /// Secure memory allocation or CSPRNG failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
