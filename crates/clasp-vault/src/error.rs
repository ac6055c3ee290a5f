//! Vault error types for `clasp-vault`.

use clasp_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by session, cache, and credential operations.
///
/// Propagation policy: cryptographic and session errors are never retried
/// automatically — retrying a wrong-key decrypt cannot succeed. Network
/// errors may be retried a small bounded number of times for idempotent
/// reads only. Every path that clears the session also clears the in-memory
/// key and its durable backup copies.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    /// Carries both derivation-input and decryption failures.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The session is absent or past its expiry. Always routes to
    /// re-authentication; all secret material has been cleared.
    #[error("session expired")]
    SessionExpired,

    /// The remote store rejected the credential. Treated identically to
    /// [`Self::SessionExpired`]: secrets cleared, re-authentication required.
    #[error("authentication rejected by remote store")]
    AuthRejected,

    /// Platform credential ceremony failed (cancelled, unsupported, timed
    /// out). Recoverable — the caller falls back to the PIN path. Never
    /// escalated to session expiry by itself.
    #[error("platform credential error: {0}")]
    PlatformCredential(String),

    /// The network is unreachable. Reads fall back to the offline snapshot;
    /// writes fail hard (there is no offline write queue).
    #[error("network unavailable")]
    NetworkUnavailable,

    /// A storage tier could not be written.
    #[error("storage error: {0}")]
    Storage(String),

    /// A sealed entry decrypted but its payload is not valid entry JSON.
    #[error("entry payload corrupted: {0}")]
    CorruptPayload(String),

    /// Entry not found by ID.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Account salt provisioning failed after bounded retries.
    #[error("profile provisioning failed: {0}")]
    ProfileProvisioning(String),

    /// A biometric gate passed but no key material is recoverable on this
    /// device. The caller must fall back to PIN entry.
    #[error("no recoverable key material on this device")]
    KeyUnrecoverable,

    /// Remote store failure that is neither authentication-class nor
    /// network-class.
    #[error("remote store error: {0}")]
    Remote(String),
}
