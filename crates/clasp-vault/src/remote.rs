//! Remote record store interface and the auth-failure interceptor.
//!
//! The remote store is an external collaborator: an authenticated CRUD API
//! over opaque ciphertext blobs. This module defines the trait boundary,
//! the error classification that drives the interceptor, and
//! [`InterceptedStore`] — an explicit decorator (not runtime proxying) that
//! wraps every call and forces the session into the expired state on any
//! authentication-class failure, so stale UI can never keep operating with
//! a dead credential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entries::EncryptedRecord;
use crate::error::VaultError;
use crate::session::SessionManager;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An authenticated identity issued by the external authentication
/// capability. The core holds a copy of its id and identifier inside the
/// session; it never manages the credential itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Opaque principal id.
    pub id: String,
    /// Human-readable identifier (e.g. email).
    pub identifier: String,
}

/// Failures surfaced by a remote store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request carried no acceptable authorization.
    #[error("unauthorized")]
    Unauthorized,

    /// The credential token exists but has expired.
    #[error("credential token expired")]
    TokenExpired,

    /// No server-side session exists for this client.
    #[error("no server-side session")]
    SessionMissing,

    /// The network is unreachable or the call timed out.
    #[error("network unreachable: {0}")]
    Network(String),

    /// A write raced another client (e.g. duplicate profile creation).
    #[error("record conflict")]
    Conflict,

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl RemoteError {
    /// Authentication-class failures: anything carrying a token, credential,
    /// or authorization signal. These force the session into the expired
    /// state via the interceptor.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::TokenExpired | Self::SessionMissing
        )
    }

    /// Network-class failures: eligible for the offline fallback on reads.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<RemoteError> for VaultError {
    fn from(e: RemoteError) -> Self {
        if e.is_auth_failure() {
            Self::AuthRejected
        } else if e.is_network() {
            Self::NetworkUnavailable
        } else {
            Self::Remote(e.to_string())
        }
    }
}

/// The remote record store collaborator.
///
/// All calls are network-bound and must be bounded by the implementation
/// (recommended timeout: 5 seconds) — a hung call is reported as
/// [`RemoteError::Network`] and the caller fails closed. Every call may
/// also fail with an authentication-class error (see
/// [`RemoteError::is_auth_failure`]).
pub trait RemoteStore: Send + Sync {
    /// Exchange an identifier + secret for a principal.
    ///
    /// # Errors
    ///
    /// [`RemoteError::Unauthorized`] on bad credentials, or any
    /// transport-level failure.
    fn authenticate(&self, identifier: &str, secret: &str) -> Result<Principal, RemoteError>;

    /// List all ciphertext records owned by the principal.
    ///
    /// # Errors
    ///
    /// Authentication-class or transport-level failures.
    fn list_entries(&self, principal_id: &str) -> Result<Vec<EncryptedRecord>, RemoteError>;

    /// Store a new ciphertext record; the store assigns id and timestamps.
    ///
    /// # Errors
    ///
    /// Authentication-class or transport-level failures.
    fn insert_entry(
        &self,
        principal_id: &str,
        encrypted_blob: &str,
    ) -> Result<EncryptedRecord, RemoteError>;

    /// Replace the blob of an existing record.
    ///
    /// # Errors
    ///
    /// Authentication-class or transport-level failures.
    fn update_entry(&self, id: &str, encrypted_blob: &str) -> Result<EncryptedRecord, RemoteError>;

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Authentication-class or transport-level failures.
    fn delete_entry(&self, id: &str) -> Result<(), RemoteError>;

    /// Read the account's encryption salt, if the profile exists.
    ///
    /// # Errors
    ///
    /// Authentication-class or transport-level failures.
    fn fetch_profile_salt(&self, principal_id: &str) -> Result<Option<String>, RemoteError>;

    /// Create the account profile carrying the encryption salt.
    ///
    /// # Errors
    ///
    /// [`RemoteError::Conflict`] when another client created it first, plus
    /// the usual authentication-class and transport-level failures.
    fn create_profile(
        &self,
        principal_id: &str,
        identifier: &str,
        salt: &str,
    ) -> Result<(), RemoteError>;
}

/// Shared handles delegate — lets a caller keep its own `Arc` to a store
/// that is also wired into a coordinator.
impl<R: RemoteStore + ?Sized> RemoteStore for Arc<R> {
    fn authenticate(&self, identifier: &str, secret: &str) -> Result<Principal, RemoteError> {
        (**self).authenticate(identifier, secret)
    }

    fn list_entries(&self, principal_id: &str) -> Result<Vec<EncryptedRecord>, RemoteError> {
        (**self).list_entries(principal_id)
    }

    fn insert_entry(
        &self,
        principal_id: &str,
        encrypted_blob: &str,
    ) -> Result<EncryptedRecord, RemoteError> {
        (**self).insert_entry(principal_id, encrypted_blob)
    }

    fn update_entry(&self, id: &str, encrypted_blob: &str) -> Result<EncryptedRecord, RemoteError> {
        (**self).update_entry(id, encrypted_blob)
    }

    fn delete_entry(&self, id: &str) -> Result<(), RemoteError> {
        (**self).delete_entry(id)
    }

    fn fetch_profile_salt(&self, principal_id: &str) -> Result<Option<String>, RemoteError> {
        (**self).fetch_profile_salt(principal_id)
    }

    fn create_profile(
        &self,
        principal_id: &str,
        identifier: &str,
        salt: &str,
    ) -> Result<(), RemoteError> {
        (**self).create_profile(principal_id, identifier, salt)
    }
}

// ---------------------------------------------------------------------------
// Read retry
// ---------------------------------------------------------------------------

/// Extra attempts after the first failure, for idempotent reads only.
pub const READ_RETRY_ATTEMPTS: u32 = 2;

/// Retry an idempotent read over network-class failures, bounded by
/// [`READ_RETRY_ATTEMPTS`]. Writes must never go through this — a timed-out
/// write may have landed.
pub fn with_read_retry<T>(
    mut op: impl FnMut() -> Result<T, RemoteError>,
) -> Result<T, RemoteError> {
    let mut result = op();
    for attempt in 0..READ_RETRY_ATTEMPTS {
        match &result {
            Err(e) if e.is_network() => {
                tracing::debug!(attempt = attempt.saturating_add(1), "retrying idempotent read");
                result = op();
            }
            _ => break,
        }
    }
    result
}

// ---------------------------------------------------------------------------
// InterceptedStore
// ---------------------------------------------------------------------------

/// Decorator that watches every remote call for authentication-class
/// failures.
///
/// On the first such failure it ends the session (clearing all secret
/// material) and invokes the `on_session_expired` hook — the place where the
/// embedding app forces navigation to its re-authentication entry point.
/// A latch makes the reaction exactly-once under concurrent failing calls;
/// it re-opens when [`Self::notify_session_started`] is called after the
/// next successful login. The hook should itself skip navigation when the
/// user is already at the re-authentication entry point.
pub struct InterceptedStore<R> {
    inner: R,
    session: Arc<SessionManager>,
    on_session_expired: Box<dyn Fn() + Send + Sync>,
    tripped: AtomicBool,
}

impl<R: RemoteStore> InterceptedStore<R> {
    /// Wrap a remote store.
    pub fn new(
        inner: R,
        session: Arc<SessionManager>,
        on_session_expired: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            session,
            on_session_expired: Box::new(on_session_expired),
            tripped: AtomicBool::new(false),
        }
    }

    /// Re-open the latch after a new session has been started.
    pub fn notify_session_started(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    /// Whether the latch has fired since the last session start.
    #[must_use]
    pub fn has_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn observe<T>(&self, result: Result<T, RemoteError>) -> Result<T, RemoteError> {
        if let Err(e) = &result {
            if e.is_auth_failure() && !self.tripped.swap(true, Ordering::SeqCst) {
                tracing::warn!(error = %e, "authentication-class failure — ending session");
                self.session.end();
                (self.on_session_expired)();
            }
        }
        result
    }
}

impl<R: RemoteStore> RemoteStore for InterceptedStore<R> {
    fn authenticate(&self, identifier: &str, secret: &str) -> Result<Principal, RemoteError> {
        self.observe(self.inner.authenticate(identifier, secret))
    }

    fn list_entries(&self, principal_id: &str) -> Result<Vec<EncryptedRecord>, RemoteError> {
        self.observe(self.inner.list_entries(principal_id))
    }

    fn insert_entry(
        &self,
        principal_id: &str,
        encrypted_blob: &str,
    ) -> Result<EncryptedRecord, RemoteError> {
        self.observe(self.inner.insert_entry(principal_id, encrypted_blob))
    }

    fn update_entry(&self, id: &str, encrypted_blob: &str) -> Result<EncryptedRecord, RemoteError> {
        self.observe(self.inner.update_entry(id, encrypted_blob))
    }

    fn delete_entry(&self, id: &str) -> Result<(), RemoteError> {
        self.observe(self.inner.delete_entry(id))
    }

    fn fetch_profile_salt(&self, principal_id: &str) -> Result<Option<String>, RemoteError> {
        self.observe(self.inner.fetch_profile_salt(principal_id))
    }

    fn create_profile(
        &self,
        principal_id: &str,
        identifier: &str,
        salt: &str,
    ) -> Result<(), RemoteError> {
        self.observe(self.inner.create_profile(principal_id, identifier, salt))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_classification() {
        assert!(RemoteError::Unauthorized.is_auth_failure());
        assert!(RemoteError::TokenExpired.is_auth_failure());
        assert!(RemoteError::SessionMissing.is_auth_failure());
        assert!(!RemoteError::Network("down".into()).is_auth_failure());
        assert!(!RemoteError::Conflict.is_auth_failure());
        assert!(!RemoteError::Backend("500".into()).is_auth_failure());
    }

    #[test]
    fn network_classification() {
        assert!(RemoteError::Network("down".into()).is_network());
        assert!(!RemoteError::Unauthorized.is_network());
    }

    #[test]
    fn remote_error_maps_into_vault_error() {
        assert!(matches!(
            VaultError::from(RemoteError::TokenExpired),
            VaultError::AuthRejected
        ));
        assert!(matches!(
            VaultError::from(RemoteError::Network("x".into())),
            VaultError::NetworkUnavailable
        ));
        assert!(matches!(
            VaultError::from(RemoteError::Backend("x".into())),
            VaultError::Remote(_)
        ));
    }

    #[test]
    fn read_retry_recovers_from_transient_network_failure() {
        let mut calls = 0u32;
        let result: Result<u32, RemoteError> = with_read_retry(|| {
            calls += 1;
            if calls < 3 {
                Err(RemoteError::Network("flaky".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[test]
    fn read_retry_gives_up_after_bound() {
        let mut calls = 0u32;
        let result: Result<(), RemoteError> = with_read_retry(|| {
            calls += 1;
            Err(RemoteError::Network("down".into()))
        });
        assert!(matches!(result, Err(RemoteError::Network(_))));
        assert_eq!(calls, 1 + READ_RETRY_ATTEMPTS);
    }

    #[test]
    fn read_retry_does_not_retry_auth_failures() {
        let mut calls = 0u32;
        let result: Result<(), RemoteError> = with_read_retry(|| {
            calls += 1;
            Err(RemoteError::Unauthorized)
        });
        assert!(matches!(result, Err(RemoteError::Unauthorized)));
        assert_eq!(calls, 1);
    }
}
