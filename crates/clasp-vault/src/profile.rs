//! Per-account encryption salt provisioning.
//!
//! The salt is generated once, at first login, and persisted by the remote
//! store next to the account profile. Two clients finishing sign-up at the
//! same moment can race to create it; the loser must adopt the winner's
//! salt, or the two devices would derive different keys from the same PIN.
//! The resolution is an idempotent upsert-or-fetch with bounded retries and
//! a fixed backoff, with a clear terminal failure.

use std::thread;
use std::time::Duration;

use clasp_crypto_core::Salt;

use crate::error::VaultError;
use crate::remote::{Principal, RemoteError, RemoteStore};

/// Total fetch-or-create attempts before giving up.
pub const PROVISION_ATTEMPTS: u32 = 3;

/// Fixed backoff between attempts.
pub const PROVISION_BACKOFF: Duration = Duration::from_millis(500);

/// Fetch the account's encryption salt, creating it on first login.
///
/// Loop, up to [`PROVISION_ATTEMPTS`] times:
/// 1. Fetch the profile salt — a hit wins immediately.
/// 2. On a miss, generate a fresh salt and try to create the profile.
///    Success wins; [`RemoteError::Conflict`] means another client created
///    it first, so the next iteration fetches theirs.
///
/// # Errors
///
/// - [`VaultError::AuthRejected`] — the store rejected the credential;
///   retrying cannot help
/// - [`VaultError::Crypto`] — the stored salt is unparseable
/// - [`VaultError::ProfileProvisioning`] — no salt after all attempts
pub fn ensure_profile_salt(
    remote: &dyn RemoteStore,
    principal: &Principal,
) -> Result<Salt, VaultError> {
    for attempt in 1..=PROVISION_ATTEMPTS {
        match remote.fetch_profile_salt(&principal.id) {
            Ok(Some(encoded)) => return Ok(Salt::decode(&encoded)?),
            Ok(None) => {
                let salt = Salt::generate();
                match remote.create_profile(&principal.id, &principal.identifier, &salt.encode())
                {
                    Ok(()) => {
                        tracing::info!(principal_id = %principal.id, "account profile created");
                        return Ok(salt);
                    }
                    Err(RemoteError::Conflict) => {
                        // Another client won the race — loop and fetch theirs.
                        tracing::debug!(attempt, "profile creation raced — refetching");
                    }
                    Err(e) if e.is_auth_failure() => return Err(VaultError::AuthRejected),
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "profile creation attempt failed");
                    }
                }
            }
            Err(e) if e.is_auth_failure() => return Err(VaultError::AuthRejected),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "profile salt fetch failed");
            }
        }

        if attempt < PROVISION_ATTEMPTS {
            thread::sleep(PROVISION_BACKOFF);
        }
    }

    Err(VaultError::ProfileProvisioning(format!(
        "no salt after {PROVISION_ATTEMPTS} attempts"
    )))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
