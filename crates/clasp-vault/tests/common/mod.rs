#![allow(dead_code)]

//! Shared fixtures for the integration suites: an in-memory remote store
//! with scriptable failures, and a scriptable platform authenticator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use clasp_crypto_core::{DerivedKey, Salt};
use clasp_vault::clock::{Clock, ManualClock};
use clasp_vault::entries::EncryptedRecord;
use clasp_vault::remote::{Principal, RemoteError, RemoteStore};
use clasp_vault::session::SessionManager;
use clasp_vault::store::{MemoryTier, StorageTier, TieredStore};
use clasp_vault::biometric::{
    AssertionRequest, CredentialCreationRequest, PlatformAuthenticator, PlatformCredentialError,
};

pub const T0: u64 = 1_700_000_000_000;

pub fn test_key() -> DerivedKey {
    DerivedKey::from_bytes([0x42; 32])
}

pub fn test_salt() -> Salt {
    Salt::decode("00112233445566778899aabbccddeeff").expect("valid salt hex")
}

pub fn principal() -> Principal {
    Principal {
        id: "p-1".into(),
        identifier: "user@example.com".into(),
    }
}

/// A session manager over fresh in-memory tiers and a manual clock.
pub fn memory_session() -> (Arc<ManualClock>, Arc<SessionManager>) {
    let clock = Arc::new(ManualClock::new(T0));
    let store = TieredStore::new(Arc::new(MemoryTier::new()), Arc::new(MemoryTier::new()));
    let manager = Arc::new(SessionManager::new(
        store,
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));
    (clock, manager)
}

/// A session manager over the given tiers (for restart simulations).
pub fn session_over(
    ephemeral: Arc<dyn StorageTier>,
    durable: Arc<dyn StorageTier>,
    clock: Arc<ManualClock>,
) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        TieredStore::new(ephemeral, durable),
        clock as Arc<dyn Clock>,
    ))
}

// ---------------------------------------------------------------------------
// Mock remote store
// ---------------------------------------------------------------------------

/// In-memory remote store with scriptable failures.
///
/// Failures come from two sources, checked in order:
/// 1. `fail_queue` — one error consumed per call, for transient faults
/// 2. `offline` — while set, every call fails with a network error
#[derive(Default)]
pub struct MockRemote {
    records: Mutex<Vec<EncryptedRecord>>,
    fail_queue: Mutex<VecDeque<RemoteError>>,
    offline: AtomicBool,
    next_id: AtomicU32,
    pub list_calls: AtomicU32,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next remote call.
    pub fn fail_next(&self, error: RemoteError) {
        self.fail_queue.lock().unwrap().push_back(error);
    }

    /// Queue the same error for the next `times` remote calls.
    pub fn fail_times(&self, error: &RemoteError, times: u32) {
        let mut queue = self.fail_queue.lock().unwrap();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Toggle the simulated network state.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Records currently held by the store.
    pub fn records(&self) -> Vec<EncryptedRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Seed a record directly, bypassing the API.
    pub fn seed_record(&self, record: EncryptedRecord) {
        self.records.lock().unwrap().push(record);
    }

    fn gate(&self) -> Result<(), RemoteError> {
        if let Some(error) = self.fail_queue.lock().unwrap().pop_front() {
            return Err(error);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("offline".into()));
        }
        Ok(())
    }

    fn fresh_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("rec-{n}")
    }
}

impl RemoteStore for MockRemote {
    fn authenticate(&self, identifier: &str, _secret: &str) -> Result<Principal, RemoteError> {
        self.gate()?;
        Ok(Principal {
            id: "p-1".into(),
            identifier: identifier.to_owned(),
        })
    }

    fn list_entries(&self, _principal_id: &str) -> Result<Vec<EncryptedRecord>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        Ok(self.records())
    }

    fn insert_entry(
        &self,
        _principal_id: &str,
        encrypted_blob: &str,
    ) -> Result<EncryptedRecord, RemoteError> {
        self.gate()?;
        let record = EncryptedRecord {
            id: self.fresh_id(),
            encrypted_blob: encrypted_blob.to_owned(),
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    fn update_entry(&self, id: &str, encrypted_blob: &str) -> Result<EncryptedRecord, RemoteError> {
        self.gate()?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RemoteError::Backend(format!("no record {id}")))?;
        record.encrypted_blob = encrypted_blob.to_owned();
        record.updated_at = "2024-06-01T00:00:00Z".into();
        Ok(record.clone())
    }

    fn delete_entry(&self, id: &str) -> Result<(), RemoteError> {
        self.gate()?;
        self.records.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    fn fetch_profile_salt(&self, _principal_id: &str) -> Result<Option<String>, RemoteError> {
        self.gate()?;
        Ok(Some(test_salt().encode()))
    }

    fn create_profile(
        &self,
        _principal_id: &str,
        _identifier: &str,
        _salt: &str,
    ) -> Result<(), RemoteError> {
        self.gate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock platform authenticator
// ---------------------------------------------------------------------------

/// Scriptable platform authenticator: always available, assertions succeed
/// unless a failure is queued.
pub struct MockPlatform {
    pub next_failure: Mutex<Option<PlatformCredentialError>>,
    created: AtomicU32,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            next_failure: Mutex::new(None),
            created: AtomicU32::new(0),
        }
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: PlatformCredentialError) {
        *self.next_failure.lock().unwrap() = Some(error);
    }
}

impl PlatformAuthenticator for MockPlatform {
    fn is_available(&self) -> bool {
        true
    }

    fn create_credential(
        &self,
        _request: &CredentialCreationRequest,
    ) -> Result<String, PlatformCredentialError> {
        if let Some(error) = self.next_failure.lock().unwrap().take() {
            return Err(error);
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cred-{n}"))
    }

    fn request_assertion(
        &self,
        request: &AssertionRequest,
    ) -> Result<String, PlatformCredentialError> {
        if let Some(error) = self.next_failure.lock().unwrap().take() {
            return Err(error);
        }
        request
            .credential_ids
            .first()
            .cloned()
            .ok_or_else(|| PlatformCredentialError::Failed("no candidate credentials".into()))
    }
}
