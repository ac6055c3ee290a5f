//! Vault entry model and sealing.
//!
//! An entry's structured fields exist in exactly one place: process memory,
//! after decryption. At rest — in the remote store and the offline cache —
//! an entry is an opaque [`EncryptedRecord`]: id, ciphertext blob, and
//! timestamps. [`seal_fields`] and [`open_record`] convert between the two,
//! and a wrong key fails loudly rather than yielding garbage.

use clasp_crypto_core::symmetric::{self, CipherToken};
use clasp_crypto_core::DerivedKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the `username` field of an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsernameKind {
    /// A plain account name.
    Username,
    /// An email address.
    Email,
    /// A numeric or opaque account id.
    Id,
}

/// The structured fields sealed inside an entry's ciphertext blob.
///
/// This is the exact JSON payload that gets encrypted — ids and timestamps
/// live outside it, on the [`EncryptedRecord`], because the remote store
/// owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFields {
    /// Service or site name.
    pub service: String,
    /// What `username` holds.
    pub username_kind: UsernameKind,
    /// Account name, email, or id for the service.
    pub username: String,
    /// The stored secret.
    pub password: String,
    /// User-chosen category.
    pub category: String,
    /// Free-form tags for search.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
}

/// Zeroize the secret-bearing fields when the value leaves memory.
///
/// Serde (de)serialization inherently creates intermediate `String` values
/// that cannot be zeroized; this covers the primary in-memory lifetime of
/// the struct itself.
impl Drop for EntryFields {
    fn drop(&mut self) {
        self.password.zeroize();
        self.username.zeroize();
        self.notes.zeroize();
    }
}

/// A decrypted vault entry — exists only in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    /// Remote-store record id.
    pub id: String,
    /// Service or site name.
    pub service: String,
    /// What `username` holds.
    pub username_kind: UsernameKind,
    /// Account name, email, or id for the service.
    pub username: String,
    /// The stored secret.
    pub password: String,
    /// User-chosen category.
    pub category: String,
    /// Free-form tags for search.
    pub tags: Vec<String>,
    /// Free-form notes.
    pub notes: String,
    /// ISO 8601 creation timestamp (remote-store owned).
    pub created_at: String,
    /// ISO 8601 last-update timestamp (remote-store owned).
    pub updated_at: String,
}

impl VaultEntry {
    /// Copy the sealable structured fields out of this entry.
    #[must_use]
    pub fn fields(&self) -> EntryFields {
        EntryFields {
            service: self.service.clone(),
            username_kind: self.username_kind,
            username: self.username.clone(),
            password: self.password.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
            notes: self.notes.clone(),
        }
    }
}

/// The at-rest form of an entry — every structured field is inside
/// `encrypted_blob`, an AES-256-GCM token string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecord {
    /// Remote-store record id.
    pub id: String,
    /// Self-contained ciphertext token of the JSON-serialized fields.
    pub encrypted_blob: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Seal entry fields into a ciphertext blob under the session key.
///
/// The fields are JSON-serialized and AES-256-GCM encrypted with a fresh
/// nonce; the returned string is the token's stable base64url form.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if serialization or encryption fails.
pub fn seal_fields(fields: &EntryFields, key: &DerivedKey) -> Result<String, VaultError> {
    let mut plaintext = serde_json::to_vec(fields)
        .map_err(|e| VaultError::CorruptPayload(format!("entry serialization failed: {e}")))?;
    let token = symmetric::encrypt(&plaintext, key)?;
    plaintext.zeroize();
    Ok(token.encode())
}

/// Open an at-rest record into a live [`VaultEntry`] under the session key.
///
/// # Errors
///
/// - [`VaultError::Crypto`] with `MalformedToken` — the blob is not a
///   parseable token
/// - [`VaultError::Crypto`] with `Decryption` — wrong key or tampered blob;
///   never silently returns garbage
/// - [`VaultError::CorruptPayload`] — decryption succeeded but the payload
///   is not valid entry JSON
pub fn open_record(record: &EncryptedRecord, key: &DerivedKey) -> Result<VaultEntry, VaultError> {
    let token = CipherToken::decode(&record.encrypted_blob)?;
    let plaintext = symmetric::decrypt(&token, key)?;
    let mut fields: EntryFields = serde_json::from_slice(plaintext.expose())
        .map_err(|e| VaultError::CorruptPayload(format!("entry payload not valid JSON: {e}")))?;

    Ok(VaultEntry {
        id: record.id.clone(),
        service: std::mem::take(&mut fields.service),
        username_kind: fields.username_kind,
        username: std::mem::take(&mut fields.username),
        password: std::mem::take(&mut fields.password),
        category: std::mem::take(&mut fields.category),
        tags: std::mem::take(&mut fields.tags),
        notes: std::mem::take(&mut fields.notes),
        created_at: record.created_at.clone(),
        updated_at: record.updated_at.clone(),
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
