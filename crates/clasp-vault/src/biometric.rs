//! Platform credential (biometric) registration and gating.
//!
//! A platform credential proves exactly one thing: this device's
//! authenticator re-verified the user. It never stores, derives, or unlocks
//! the vault key — after a successful assertion the caller still has to
//! recover the actual key through the session recovery path. The gate is a
//! convenience re-entry mechanism, not a key source; a device holding a
//! registered credential but no recoverable key backup cannot complete a
//! biometric login and must fall back to PIN entry.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::error::VaultError;
use crate::store::{keys, StorageTier};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Ceremony challenge length in bytes.
pub const CHALLENGE_LEN: usize = 32;

/// Timeout handed to the platform for user-interactive ceremonies.
/// The user may walk away; the platform must not hang forever.
pub const PLATFORM_CEREMONY_TIMEOUT_MS: u64 = 60_000;

/// How long a successful assertion keeps the gate open: 30 minutes.
pub const BIOMETRIC_GATE_VALIDITY_MS: u64 = 30 * 60 * 1000;

// ---------------------------------------------------------------------------
// Platform boundary
// ---------------------------------------------------------------------------

/// Device capability state for the platform authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricAvailability {
    /// No verifying platform authenticator on this device.
    Unavailable,
    /// An authenticator exists but no credential is registered.
    Unregistered,
    /// An authenticator exists and at least one credential is registered.
    Registered,
}

/// Why a platform credential ceremony failed.
///
/// All variants are recoverable: the caller falls back to the PIN path.
/// None of them ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformCredentialError {
    /// The user dismissed the prompt.
    #[error("user cancelled the credential ceremony")]
    Cancelled,

    /// The platform has no verifying authenticator.
    #[error("platform authenticator unsupported")]
    Unsupported,

    /// The ceremony exceeded its timeout.
    #[error("credential ceremony timed out")]
    Timeout,

    /// Any other platform failure.
    #[error("platform credential failure: {0}")]
    Failed(String),
}

impl From<PlatformCredentialError> for VaultError {
    fn from(e: PlatformCredentialError) -> Self {
        Self::PlatformCredential(e.to_string())
    }
}

/// A credential creation request handed to the platform.
#[derive(Debug, Clone)]
pub struct CredentialCreationRequest {
    /// Fresh random challenge for this ceremony.
    pub challenge: [u8; CHALLENGE_LEN],
    /// The principal the credential is bound to.
    pub principal_id: String,
    /// Name shown in the platform prompt.
    pub display_name: String,
    /// Ceremony timeout in milliseconds.
    pub timeout_ms: u64,
}

/// An assertion request against previously registered credential ids.
#[derive(Debug, Clone)]
pub struct AssertionRequest {
    /// Fresh random challenge for this ceremony.
    pub challenge: [u8; CHALLENGE_LEN],
    /// Candidate credential ids the platform may satisfy.
    pub credential_ids: Vec<String>,
    /// Ceremony timeout in milliseconds.
    pub timeout_ms: u64,
}

/// The boundary to the OS/browser credential machinery.
///
/// [`Self::is_available`] has no side effects and may be re-run freely.
/// The two ceremony calls are user-interactive and may block until the
/// user acts or cancels — implementations must honor `timeout_ms` and are
/// expected to be cancellable.
pub trait PlatformAuthenticator: Send + Sync {
    /// Whether a user-verifying platform authenticator is present.
    fn is_available(&self) -> bool;

    /// Run the credential creation ceremony. Returns the new credential id
    /// (stable, opaque, base64url).
    ///
    /// # Errors
    ///
    /// Any [`PlatformCredentialError`] — all recoverable.
    fn create_credential(
        &self,
        request: &CredentialCreationRequest,
    ) -> Result<String, PlatformCredentialError>;

    /// Run the assertion ceremony. Returns the id of the credential that
    /// satisfied it.
    ///
    /// # Errors
    ///
    /// Any [`PlatformCredentialError`] — all recoverable.
    fn request_assertion(
        &self,
        request: &AssertionRequest,
    ) -> Result<String, PlatformCredentialError>;
}

// ---------------------------------------------------------------------------
// Credential records
// ---------------------------------------------------------------------------

/// One registered platform credential for a principal on this device.
///
/// Contains no key material — only the linkage between a principal and a
/// platform credential id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricCredential {
    /// The principal this credential re-verifies.
    pub principal_id: String,
    /// Opaque platform credential id.
    pub credential_id: String,
    /// Registration instant, epoch ms.
    pub created_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Registers, asserts, and revokes platform credentials for this device.
pub struct BiometricManager<P> {
    platform: P,
    durable: Arc<dyn StorageTier>,
    ephemeral: Arc<dyn StorageTier>,
    clock: Arc<dyn Clock>,
}

impl<P: PlatformAuthenticator> BiometricManager<P> {
    /// Create a manager. Credential records persist in `durable`; the
    /// short-lived verified flag lives in `ephemeral`.
    pub fn new(
        platform: P,
        durable: Arc<dyn StorageTier>,
        ephemeral: Arc<dyn StorageTier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            platform,
            durable,
            ephemeral,
            clock,
        }
    }

    /// The wrapped platform authenticator.
    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// Current device state: `Unavailable → Unregistered → Registered`.
    /// Side-effect free.
    #[must_use]
    pub fn availability(&self) -> BiometricAvailability {
        if !self.platform.is_available() {
            return BiometricAvailability::Unavailable;
        }
        if self.load_credentials().is_empty() {
            BiometricAvailability::Unregistered
        } else {
            BiometricAvailability::Registered
        }
    }

    /// Register a platform credential for the principal.
    ///
    /// Runs the creation ceremony against a fresh random challenge and, on
    /// success, stores only `{principal_id, credential_id, created_at}` —
    /// never any key material. Registering again replaces nothing; multiple
    /// credentials per principal are allowed (one per ceremony).
    ///
    /// # Errors
    ///
    /// [`VaultError::PlatformCredential`] on cancellation, unsupported
    /// platform, timeout, or storage failure mapped from the ceremony.
    /// None of these is fatal to the rest of the app.
    pub fn register(
        &self,
        principal_id: &str,
        display_name: &str,
    ) -> Result<BiometricCredential, VaultError> {
        if !self.platform.is_available() {
            return Err(PlatformCredentialError::Unsupported.into());
        }

        let request = CredentialCreationRequest {
            challenge: fresh_challenge(),
            principal_id: principal_id.to_owned(),
            display_name: display_name.to_owned(),
            timeout_ms: PLATFORM_CEREMONY_TIMEOUT_MS,
        };
        let credential_id = self.platform.create_credential(&request)?;

        let credential = BiometricCredential {
            principal_id: principal_id.to_owned(),
            credential_id,
            created_at_ms: self.clock.now_ms(),
        };

        let mut credentials = self.load_credentials();
        credentials.push(credential.clone());
        self.save_credentials(&credentials)?;

        tracing::info!(principal_id, "platform credential registered");
        Ok(credential)
    }

    /// Run the assertion ceremony against the stored credentials, filtered
    /// by principal when given.
    ///
    /// Returns `Ok(false)` when nothing is registered to assert against.
    /// On success, opens the verified gate for
    /// [`BIOMETRIC_GATE_VALIDITY_MS`] — and nothing more. The caller must
    /// still recover the derived key through the session recovery path;
    /// a passing gate is not a login by itself.
    ///
    /// # Errors
    ///
    /// [`VaultError::PlatformCredential`] if the ceremony fails —
    /// recoverable, falls back to the PIN path.
    pub fn authenticate(&self, principal_id: Option<&str>) -> Result<bool, VaultError> {
        let credential_ids: Vec<String> = self
            .load_credentials()
            .into_iter()
            .filter(|c| principal_id.is_none_or(|p| c.principal_id == p))
            .map(|c| c.credential_id)
            .collect();

        if credential_ids.is_empty() {
            tracing::debug!("no platform credential registered — gate stays closed");
            return Ok(false);
        }

        let request = AssertionRequest {
            challenge: fresh_challenge(),
            credential_ids,
            timeout_ms: PLATFORM_CEREMONY_TIMEOUT_MS,
        };
        self.platform.request_assertion(&request)?;

        let now = self.clock.now_ms();
        self.ephemeral.put(keys::BIOMETRIC_VERIFIED, "true")?;
        self.ephemeral
            .put(keys::BIOMETRIC_VERIFIED_AT, &now.to_string())?;
        tracing::info!("platform assertion verified — gate open");
        Ok(true)
    }

    /// Whether a verified gate is currently open (assertion within the last
    /// 30 minutes).
    #[must_use]
    pub fn is_gate_open(&self) -> bool {
        if self.ephemeral.get(keys::BIOMETRIC_VERIFIED).as_deref() != Some("true") {
            return false;
        }
        let Some(at) = self
            .ephemeral
            .get(keys::BIOMETRIC_VERIFIED_AT)
            .and_then(|raw| raw.parse::<u64>().ok())
        else {
            return false;
        };
        self.clock.now_ms().saturating_sub(at) < BIOMETRIC_GATE_VALIDITY_MS
    }

    /// Close the verified gate.
    pub fn clear_gate(&self) {
        for result in [
            self.ephemeral.remove(keys::BIOMETRIC_VERIFIED),
            self.ephemeral.remove(keys::BIOMETRIC_VERIFIED_AT),
        ] {
            if let Err(e) = result {
                tracing::warn!(error = %e, "gate flag removal failed");
            }
        }
    }

    /// Delete every stored credential for the principal. Irreversible;
    /// confirmation is a UI concern, not this layer's.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the record list cannot be written.
    pub fn remove(&self, principal_id: &str) -> Result<(), VaultError> {
        let credentials: Vec<BiometricCredential> = self
            .load_credentials()
            .into_iter()
            .filter(|c| c.principal_id != principal_id)
            .collect();
        self.save_credentials(&credentials)?;
        tracing::info!(principal_id, "platform credentials removed");
        Ok(())
    }

    /// Whether any credential is registered, optionally for one principal.
    /// Pure lookup.
    #[must_use]
    pub fn is_registered(&self, principal_id: Option<&str>) -> bool {
        self.load_credentials()
            .iter()
            .any(|c| principal_id.is_none_or(|p| c.principal_id == p))
    }

    fn load_credentials(&self) -> Vec<BiometricCredential> {
        let Some(json) = self.durable.get(keys::BIOMETRIC_CREDENTIALS) else {
            return Vec::new();
        };
        serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "credential records unparseable — treating as none");
            Vec::new()
        })
    }

    fn save_credentials(&self, credentials: &[BiometricCredential]) -> Result<(), VaultError> {
        let json = serde_json::to_string(credentials)
            .map_err(|e| VaultError::Storage(format!("credential serialization failed: {e}")))?;
        self.durable.put(keys::BIOMETRIC_CREDENTIALS, &json)
    }
}

/// Fresh random ceremony challenge from the OS CSPRNG.
fn fresh_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
