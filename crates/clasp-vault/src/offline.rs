//! Offline snapshot cache and the online/offline read path.
//!
//! The vault stays readable without connectivity by mirroring the last
//! known ciphertext record set — and the key they were sealed under — into
//! a durable cache tier. Only ciphertext ever rests in the cache; the
//! structured entry fields are reconstructed in memory on load.
//!
//! Precedence: when connectivity is present, a fresh fetch + decrypt always
//! supersedes the snapshot. The snapshot serves reads only when the fetch
//! fails, and the result is marked stale for the UI. Writes are rejected
//! outright while offline — there is no offline write queue, which trades
//! write availability for freedom from conflict resolution.

use std::sync::Arc;

use clasp_crypto_core::DerivedKey;

use crate::entries::{open_record, seal_fields, EncryptedRecord, EntryFields, VaultEntry};
use crate::error::VaultError;
use crate::remote::{with_read_retry, RemoteStore};
use crate::session::SessionManager;
use crate::store::{keys, StorageTier};

// ---------------------------------------------------------------------------
// Snapshot cache
// ---------------------------------------------------------------------------

/// Durable cache of the last successful fetch: ciphertext records plus the
/// key that seals them.
pub struct OfflineCache {
    tier: Arc<dyn StorageTier>,
}

impl OfflineCache {
    /// Create a cache over the given durable tier.
    #[must_use]
    pub fn new(tier: Arc<dyn StorageTier>) -> Self {
        Self { tier }
    }

    /// Overwrite the cached record list and key wholesale. Called after
    /// every successful online fetch — there is no merging.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the cache tier cannot be written.
    pub fn persist_snapshot(
        &self,
        records: &[EncryptedRecord],
        key: &DerivedKey,
    ) -> Result<(), VaultError> {
        let json = serde_json::to_string(records)
            .map_err(|e| VaultError::Storage(format!("snapshot serialization failed: {e}")))?;
        self.tier.put(keys::CACHED_ENTRIES, &json)?;
        self.tier.put(keys::CACHED_DERIVED_KEY, &key.encode())?;
        tracing::debug!(records = records.len(), "offline snapshot persisted");
        Ok(())
    }

    /// Load the cached record set and key, or `None` when the cache is
    /// empty, partial, or unparseable (fail closed — a broken snapshot is
    /// no snapshot).
    #[must_use]
    pub fn load_snapshot(&self) -> Option<(Vec<EncryptedRecord>, DerivedKey)> {
        let entries_json = self.tier.get(keys::CACHED_ENTRIES)?;
        let key_hex = self.tier.get(keys::CACHED_DERIVED_KEY)?;

        let records: Vec<EncryptedRecord> = match serde_json::from_str(&entries_json) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "cached entry list unparseable — ignoring snapshot");
                return None;
            }
        };
        let key = match DerivedKey::decode(&key_hex) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "cached key unparseable — ignoring snapshot");
                return None;
            }
        };
        Some((records, key))
    }

    /// Drop the cached key copy. Entry ciphertext may stay — it is opaque
    /// without the key — but a cleared session must not leave a usable key
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the cache tier cannot be written.
    pub fn clear_key(&self) -> Result<(), VaultError> {
        self.tier.remove(keys::CACHED_DERIVED_KEY)
    }

    /// Drop the whole snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the cache tier cannot be written.
    pub fn clear(&self) -> Result<(), VaultError> {
        self.tier.remove(keys::CACHED_ENTRIES)?;
        self.tier.remove(keys::CACHED_DERIVED_KEY)
    }
}

// ---------------------------------------------------------------------------
// Read/write coordination
// ---------------------------------------------------------------------------

/// Whether a returned entry set came from a live fetch or the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Decrypted from a fetch that just succeeded.
    Fresh,
    /// Served from the offline snapshot — possibly behind the remote store.
    Stale,
}

/// Coordinates the online fetch path with the offline fallback.
///
/// `R` is typically an
/// [`InterceptedStore`](crate::remote::InterceptedStore), so every call
/// made here is already watched for authentication-class failures.
pub struct OfflineCoordinator<R> {
    remote: R,
    cache: OfflineCache,
    session: Arc<SessionManager>,
}

impl<R: RemoteStore> OfflineCoordinator<R> {
    /// Wire the coordinator together.
    pub fn new(remote: R, cache: OfflineCache, session: Arc<SessionManager>) -> Self {
        Self {
            remote,
            cache,
            session,
        }
    }

    /// The wrapped remote store.
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// The snapshot cache.
    pub const fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    /// Load and decrypt the principal's entry set.
    ///
    /// Online path: fetch (with bounded retry over network failures),
    /// decrypt everything, persist the snapshot, return `Fresh`. A snapshot
    /// persistence failure is logged but non-fatal — the live data is
    /// already in hand.
    ///
    /// Offline path: a network-class or backend fetch failure falls back to
    /// the snapshot, decrypted under the cached key and returned `Stale`.
    ///
    /// A decryption failure is loud in both paths: the key is wrong, and
    /// no amount of caching or retrying fixes that — the caller routes to
    /// re-authentication.
    ///
    /// # Errors
    ///
    /// - [`VaultError::SessionExpired`] — no resident derived key
    /// - [`VaultError::AuthRejected`] — the store rejected the credential
    /// - [`VaultError::Crypto`] — a record failed to decrypt
    /// - [`VaultError::NetworkUnavailable`] — fetch failed and no usable
    ///   snapshot exists
    pub fn load_entries(
        &self,
        principal_id: &str,
    ) -> Result<(Vec<VaultEntry>, Freshness), VaultError> {
        let key = self.session.derived_key().ok_or(VaultError::SessionExpired)?;

        match with_read_retry(|| self.remote.list_entries(principal_id)) {
            Ok(records) => {
                let mut entries = Vec::with_capacity(records.len());
                for record in &records {
                    entries.push(open_record(record, &key)?);
                }
                if let Err(e) = self.cache.persist_snapshot(&records, &key) {
                    tracing::warn!(error = %e, "snapshot persistence failed — continuing online");
                }
                Ok((entries, Freshness::Fresh))
            }
            Err(e) if e.is_auth_failure() => Err(VaultError::AuthRejected),
            Err(e) => {
                tracing::info!(error = %e, "fetch failed — falling back to offline snapshot");
                let (records, cached_key) = self
                    .cache
                    .load_snapshot()
                    .ok_or(VaultError::NetworkUnavailable)?;
                let mut entries = Vec::with_capacity(records.len());
                for record in &records {
                    entries.push(open_record(record, &cached_key)?);
                }
                Ok((entries, Freshness::Stale))
            }
        }
    }

    /// Seal and store a new entry. Fails hard while offline.
    ///
    /// # Errors
    ///
    /// [`VaultError::SessionExpired`], [`VaultError::NetworkUnavailable`]
    /// (no write queue), [`VaultError::AuthRejected`], or a crypto failure.
    pub fn create_entry(
        &self,
        principal_id: &str,
        fields: &EntryFields,
    ) -> Result<EncryptedRecord, VaultError> {
        let key = self.session.derived_key().ok_or(VaultError::SessionExpired)?;
        let blob = seal_fields(fields, &key)?;
        Ok(self.remote.insert_entry(principal_id, &blob)?)
    }

    /// Seal and replace an existing entry's blob. Fails hard while offline.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_entry`].
    pub fn update_entry(
        &self,
        id: &str,
        fields: &EntryFields,
    ) -> Result<EncryptedRecord, VaultError> {
        let key = self.session.derived_key().ok_or(VaultError::SessionExpired)?;
        let blob = seal_fields(fields, &key)?;
        Ok(self.remote.update_entry(id, &blob)?)
    }

    /// Delete an entry. Fails hard while offline.
    ///
    /// # Errors
    ///
    /// [`VaultError::NetworkUnavailable`], [`VaultError::AuthRejected`], or
    /// a backend failure.
    pub fn delete_entry(&self, id: &str) -> Result<(), VaultError> {
        Ok(self.remote.delete_entry(id)?)
    }

    /// Cold-start recovery: restore the session key from the durable backup
    /// (see [`SessionManager::attempt_recovery`]).
    ///
    /// # Errors
    ///
    /// [`VaultError::SessionExpired`] or [`VaultError::KeyUnrecoverable`] —
    /// both mean the PIN prompt is next.
    pub fn recover_session(&self) -> Result<(), VaultError> {
        self.session.attempt_recovery().map(|_| ())
    }

    /// Explicit logout: clear the session, every durable secret copy, and
    /// the cached key. Idempotent.
    pub fn sign_out(&self) {
        self.session.end();
        if let Err(e) = self.cache.clear_key() {
            tracing::warn!(error = %e, "cached key removal failed during sign-out");
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
