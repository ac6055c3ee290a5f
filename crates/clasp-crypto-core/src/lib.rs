//! `clasp-crypto-core` — Pure cryptographic primitives for CLASP.
//!
//! This crate is the audit target: zero network, zero async, zero storage
//! dependencies. Everything here is a pure function of its inputs plus the
//! OS CSPRNG.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod kdf;
pub mod symmetric;

pub mod password;

pub use error::CryptoError;
pub use kdf::{derive_key, DerivedKey, Salt, KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN};
pub use memory::SecretBuffer;
pub use password::{
    generate_password, score_password_strength, CharClasses, StrengthReport, StrengthTier,
    DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH,
};
pub use symmetric::{decrypt, encrypt, CipherToken, NONCE_LEN, TAG_LEN};
