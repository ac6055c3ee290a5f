//! Dual-tier key-value storage for session and cache state.
//!
//! The session record must survive a process restart but also self-clear
//! when the hosting context ends, so it is replicated across two tiers:
//!
//! - **ephemeral** — [`MemoryTier`], gone when the process exits
//! - **durable** — [`FileTier`], a small JSON document on disk
//!
//! [`TieredStore`] pairs the two with a read-repair policy: an ephemeral
//! miss that hits in the durable tier repopulates the ephemeral copy. The
//! ephemeral tier is authoritative when both are present. There is no
//! cross-tier transaction — writes are rare and user-driven, so the
//! discipline is last-writer-wins.
//!
//! Any unreadable or corrupt tier behaves as empty: a broken session record
//! forces re-authentication instead of a panic or a half-trusted session.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::VaultError;

/// Well-known keys for the storage tiers.
pub mod keys {
    /// Serialized [`crate::session::Session`] record (both tiers).
    pub const SESSION: &str = "session";
    /// Last activity-extension timestamp in epoch ms (both tiers).
    pub const SESSION_TIMESTAMP: &str = "session-timestamp";
    /// Hex form of the in-use derived key (ephemeral tier only).
    pub const DERIVED_KEY: &str = "derived-key";
    /// Restart backup of the derived key (durable tier only).
    pub const BACKUP_DERIVED_KEY: &str = "backup-derived-key";
    /// Restart backup of the account salt (durable tier only).
    pub const BACKUP_SALT: &str = "backup-salt";
    /// Serialized ciphertext records for offline reads (cache tier).
    pub const CACHED_ENTRIES: &str = "cached-entries";
    /// Hex form of the key the cached entries were sealed under (cache tier).
    pub const CACHED_DERIVED_KEY: &str = "cached-derived-key";
    /// Serialized list of registered platform credentials (durable tier).
    pub const BIOMETRIC_CREDENTIALS: &str = "biometric-credentials";
    /// `"true"` while a platform assertion gate is open (ephemeral tier).
    pub const BIOMETRIC_VERIFIED: &str = "biometric-verified";
    /// Epoch-ms timestamp of the last successful assertion (ephemeral tier).
    pub const BIOMETRIC_VERIFIED_AT: &str = "biometric-verified-at";
}

// ---------------------------------------------------------------------------
// Tier trait
// ---------------------------------------------------------------------------

/// A flat string key-value storage backend.
///
/// Reads are infallible by contract: any backend failure reads as "absent"
/// so callers fail closed. Writes report their failures.
pub trait StorageTier: Send + Sync {
    /// Read a value, or `None` if absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the backend cannot be written.
    fn put(&self, key: &str, value: &str) -> Result<(), VaultError>;

    /// Remove a key if present.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), VaultError>;

    /// Remove every key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the backend cannot be written.
    fn clear(&self) -> Result<(), VaultError>;
}

// ---------------------------------------------------------------------------
// MemoryTier — ephemeral
// ---------------------------------------------------------------------------

/// In-process tier — cleared when the process ends.
#[derive(Default)]
pub struct MemoryTier {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryTier {
    /// Create an empty tier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageTier for MemoryTier {
    fn get(&self, key: &str) -> Option<String> {
        // A poisoned lock reads as absent (fail closed).
        self.map.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| VaultError::Storage("ephemeral tier lock poisoned".into()))?;
        map.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| VaultError::Storage("ephemeral tier lock poisoned".into()))?;
        map.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), VaultError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| VaultError::Storage("ephemeral tier lock poisoned".into()))?;
        map.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileTier — durable
// ---------------------------------------------------------------------------

/// File-backed tier — one JSON document holding the whole key-value map.
///
/// Writes go through an atomic pattern (write `.tmp`, then rename) so a
/// crash mid-write leaves the previous document intact rather than a
/// truncated one. A missing or corrupt document reads as empty.
pub struct FileTier {
    path: PathBuf,
}

impl FileTier {
    /// Create a tier backed by the given document path. The file is created
    /// lazily on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> HashMap<String, String> {
        fs::read_to_string(&self.path).map_or_else(
            |_| HashMap::new(),
            |contents| {
                serde_json::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!(path = %self.path.display(), error = %e,
                        "durable tier document unreadable — treating as empty");
                    HashMap::new()
                })
            },
        )
    }

    fn save(&self, map: &HashMap<String, String>) -> Result<(), VaultError> {
        let json = serde_json::to_string(map)
            .map_err(|e| VaultError::Storage(format!("tier serialization failed: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .map_err(|e| VaultError::Storage(format!("tier write failed: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| VaultError::Storage(format!("tier rename failed: {e}")))?;
        Ok(())
    }
}

impl StorageTier for FileTier {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let mut map = self.load();
        map.insert(key.to_owned(), value.to_owned());
        self.save(&map)
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        let mut map = self.load();
        if map.remove(key).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), VaultError> {
        self.save(&HashMap::new())
    }
}

// ---------------------------------------------------------------------------
// TieredStore — ephemeral + durable with read-repair
// ---------------------------------------------------------------------------

/// The ephemeral + durable tier pair used for the session record.
#[derive(Clone)]
pub struct TieredStore {
    ephemeral: Arc<dyn StorageTier>,
    durable: Arc<dyn StorageTier>,
}

impl TieredStore {
    /// Pair an ephemeral and a durable tier.
    #[must_use]
    pub fn new(ephemeral: Arc<dyn StorageTier>, durable: Arc<dyn StorageTier>) -> Self {
        Self { ephemeral, durable }
    }

    /// The ephemeral tier.
    #[must_use]
    pub fn ephemeral(&self) -> &Arc<dyn StorageTier> {
        &self.ephemeral
    }

    /// The durable tier.
    #[must_use]
    pub fn durable(&self) -> &Arc<dyn StorageTier> {
        &self.durable
    }

    /// Read with the repair policy: ephemeral miss → durable hit →
    /// repopulate ephemeral. The ephemeral tier wins when both are present.
    #[must_use]
    pub fn get_with_repair(&self, key: &str) -> Option<String> {
        if let Some(value) = self.ephemeral.get(key) {
            return Some(value);
        }
        let value = self.durable.get(key)?;
        if let Err(e) = self.ephemeral.put(key, &value) {
            tracing::warn!(key, error = %e, "ephemeral tier repair failed");
        }
        Some(value)
    }

    /// Write the same value to both tiers.
    ///
    /// # Errors
    ///
    /// Returns the first tier write failure.
    pub fn put_both(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.ephemeral.put(key, value)?;
        self.durable.put(key, value)
    }

    /// Remove a key from both tiers.
    ///
    /// # Errors
    ///
    /// Returns the first tier write failure (removal still proceeds on the
    /// other tier before the error is reported).
    pub fn remove_both(&self, key: &str) -> Result<(), VaultError> {
        let first = self.ephemeral.remove(key);
        let second = self.durable.remove(key);
        first.and(second)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn file_tier() -> (tempfile::TempDir, FileTier) {
        let dir = tempfile::tempdir().expect("tempdir");
        let tier = FileTier::new(dir.path().join("tier.json"));
        (dir, tier)
    }

    #[test]
    fn memory_tier_roundtrip() {
        let tier = MemoryTier::new();
        assert_eq!(tier.get("k"), None);
        tier.put("k", "v").unwrap();
        assert_eq!(tier.get("k").as_deref(), Some("v"));
        tier.remove("k").unwrap();
        assert_eq!(tier.get("k"), None);
    }

    #[test]
    fn memory_tier_clear() {
        let tier = MemoryTier::new();
        tier.put("a", "1").unwrap();
        tier.put("b", "2").unwrap();
        tier.clear().unwrap();
        assert_eq!(tier.get("a"), None);
        assert_eq!(tier.get("b"), None);
    }

    #[test]
    fn file_tier_roundtrip() {
        let (_dir, tier) = file_tier();
        assert_eq!(tier.get("k"), None);
        tier.put("k", "v").unwrap();
        assert_eq!(tier.get("k").as_deref(), Some("v"));
        tier.remove("k").unwrap();
        assert_eq!(tier.get("k"), None);
    }

    #[test]
    fn file_tier_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tier.json");
        FileTier::new(&path).put("k", "v").unwrap();
        let reopened = FileTier::new(&path);
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn file_tier_corrupt_document_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tier.json");
        std::fs::write(&path, "{not valid json").unwrap();
        let tier = FileTier::new(&path);
        assert_eq!(tier.get("k"), None);
        // A write replaces the corrupt document.
        tier.put("k", "v").unwrap();
        assert_eq!(tier.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn file_tier_remove_missing_key_is_noop() {
        let (_dir, tier) = file_tier();
        tier.remove("missing").unwrap();
        assert_eq!(tier.get("missing"), None);
    }

    #[test]
    fn tiered_get_prefers_ephemeral() {
        let ephemeral = Arc::new(MemoryTier::new());
        let durable = Arc::new(MemoryTier::new());
        ephemeral.put("k", "fresh").unwrap();
        durable.put("k", "stale").unwrap();
        let store = TieredStore::new(ephemeral, durable);
        assert_eq!(store.get_with_repair("k").as_deref(), Some("fresh"));
    }

    #[test]
    fn tiered_get_repairs_ephemeral_from_durable() {
        let ephemeral = Arc::new(MemoryTier::new());
        let durable = Arc::new(MemoryTier::new());
        durable.put("k", "v").unwrap();
        let store = TieredStore::new(Arc::clone(&ephemeral) as Arc<dyn StorageTier>, durable);
        assert_eq!(store.get_with_repair("k").as_deref(), Some("v"));
        // The ephemeral copy was repaired.
        assert_eq!(ephemeral.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn tiered_put_and_remove_hit_both() {
        let ephemeral = Arc::new(MemoryTier::new());
        let durable = Arc::new(MemoryTier::new());
        let store = TieredStore::new(
            Arc::clone(&ephemeral) as Arc<dyn StorageTier>,
            Arc::clone(&durable) as Arc<dyn StorageTier>,
        );
        store.put_both("k", "v").unwrap();
        assert_eq!(ephemeral.get("k").as_deref(), Some("v"));
        assert_eq!(durable.get("k").as_deref(), Some("v"));
        store.remove_both("k").unwrap();
        assert_eq!(ephemeral.get("k"), None);
        assert_eq!(durable.get("k"), None);
    }
}
