//! `clasp-vault` — session, offline cache, and credential orchestration for
//! CLASP.
//!
//! This crate owns everything between the pure crypto primitives
//! (`clasp-crypto-core`) and the UI: the dual-tier session record, the
//! derived key's storage residency, the offline ciphertext snapshot, the
//! platform-credential gate, and the interceptor that expires the session
//! when the remote store rejects a credential.
//!
//! The flow a consumer wires together:
//!
//! 1. [`remote::RemoteStore::authenticate`] → a [`remote::Principal`]
//! 2. [`profile::ensure_profile_salt`] → the account [`Salt`](clasp_crypto_core::Salt)
//! 3. `clasp_crypto_core::derive_key(pin, salt)` → the session key
//! 4. [`session::SessionManager::start`] + [`session::ExpiryTimer::arm`]
//! 5. Vault reads/writes via [`offline::OfflineCoordinator`], whose remote
//!    store is wrapped in a [`remote::InterceptedStore`]
//! 6. After a restart, [`session::SessionManager::attempt_recovery`]
//!    restores the key silently — optionally gated behind
//!    [`biometric::BiometricManager::authenticate`]

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod clock;
pub mod error;
pub mod store;

pub mod session;

pub mod entries;

pub mod remote;
pub mod profile;

pub mod offline;

pub mod biometric;

pub use biometric::{
    BiometricAvailability, BiometricCredential, BiometricManager, PlatformAuthenticator,
    PlatformCredentialError, BIOMETRIC_GATE_VALIDITY_MS, PLATFORM_CEREMONY_TIMEOUT_MS,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entries::{
    open_record, seal_fields, EncryptedRecord, EntryFields, UsernameKind, VaultEntry,
};
pub use error::VaultError;
pub use offline::{Freshness, OfflineCache, OfflineCoordinator};
pub use profile::ensure_profile_salt;
pub use remote::{
    with_read_retry, InterceptedStore, Principal, RemoteError, RemoteStore, READ_RETRY_ATTEMPTS,
};
pub use session::{
    ExpiryTimer, Session, SessionManager, SESSION_DURATION_MS, TOUCH_DEBOUNCE_MS,
};
pub use store::{keys, FileTier, MemoryTier, StorageTier, TieredStore};
