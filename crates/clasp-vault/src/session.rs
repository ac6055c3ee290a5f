//! Session lifecycle — issue, validate, extend, recover, expire.
//!
//! The [`SessionManager`] is the single owner of the process-wide session
//! record and the derived key's storage residency. UI code never touches the
//! tiers directly; everything goes through this interface.
//!
//! State machine: `NoSession → Active → Expired`, with transitions driven by
//! [`SessionManager::start`], the sliding extension in
//! [`SessionManager::touch`], explicit [`SessionManager::end`], the
//! [`ExpiryTimer`], and the auth-failure interceptor (which calls `end`).
//! Expiry observed by any of the concurrent checkers wins; the transition is
//! idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clasp_crypto_core::{DerivedKey, Salt};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::VaultError;
use crate::store::{keys, TieredStore};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Session lifetime from issue (or extension) to expiry: 1 hour.
///
/// Must agree with the server-side gate, which independently enforces the
/// same absolute window per authenticated request.
pub const SESSION_DURATION_MS: u64 = 60 * 60 * 1000;

/// Debounce window for activity-based extension: 5 minutes.
pub const TOUCH_DEBOUNCE_MS: u64 = 5 * 60 * 1000;

/// Poll interval for the expiry timer thread.
const TIMER_CHECK_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// Time-boxed proof that a principal is authenticated on this device.
///
/// Owned exclusively by [`SessionManager`]; other components receive copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque principal id from the authentication capability.
    pub principal_id: String,
    /// Human-readable identifier (e.g. email).
    pub identifier: String,
    /// Issue (or last extension) instant, epoch ms.
    pub issued_at_ms: u64,
    /// Hard expiry instant, epoch ms.
    pub expires_at_ms: u64,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owner of the session record across both storage tiers.
pub struct SessionManager {
    store: TieredStore,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create a manager over the given tier pair and clock.
    #[must_use]
    pub fn new(store: TieredStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The tier pair this manager owns. Exposed for composition with the
    /// recovery and biometric paths — not for direct session mutation.
    #[must_use]
    pub const fn store(&self) -> &TieredStore {
        &self.store
    }

    /// The clock used for expiry arithmetic.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Issue a new session after successful authentication.
    ///
    /// Writes the session record and touch timestamp to both tiers, the
    /// derived key to the ephemeral tier, and the key/salt restart backups
    /// to the durable tier. Moves the state machine to `Active`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if a tier write fails; no partial
    /// session should be trusted afterwards (the caller should `end()`).
    pub fn start(
        &self,
        principal_id: &str,
        identifier: &str,
        key: &DerivedKey,
        salt: &Salt,
    ) -> Result<Session, VaultError> {
        let now = self.clock.now_ms();
        let session = Session {
            principal_id: principal_id.to_owned(),
            identifier: identifier.to_owned(),
            issued_at_ms: now,
            expires_at_ms: now.saturating_add(SESSION_DURATION_MS),
        };

        let json = serde_json::to_string(&session)
            .map_err(|e| VaultError::Storage(format!("session serialization failed: {e}")))?;
        self.store.put_both(keys::SESSION, &json)?;
        self.store.put_both(keys::SESSION_TIMESTAMP, &now.to_string())?;

        self.store.ephemeral().put(keys::DERIVED_KEY, &key.encode())?;
        self.store
            .durable()
            .put(keys::BACKUP_DERIVED_KEY, &key.encode())?;
        self.store.durable().put(keys::BACKUP_SALT, &salt.encode())?;

        tracing::info!(principal_id, "session started");
        Ok(session)
    }

    /// Read the stored session record, repairing the ephemeral tier from the
    /// durable one on a miss. Returns `None` when absent or unparseable —
    /// a broken record is treated as no session at all.
    ///
    /// Does **not** check expiry; use [`Self::is_valid`] for that.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        let json = self.store.get_with_repair(keys::SESSION)?;
        match serde_json::from_str(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "session record unparseable — treating as absent");
                None
            }
        }
    }

    /// Whether a live session exists right now.
    ///
    /// Returns `false` when the record is absent, unreadable, or past
    /// `expires_at`. As a side effect of returning `true`, records activity
    /// via [`Self::touch`].
    pub fn is_valid(&self) -> bool {
        let Some(session) = self.current() else {
            return false;
        };
        if self.clock.now_ms() > session.expires_at_ms {
            tracing::info!("session past expiry — clearing");
            self.end();
            return false;
        }
        self.touch();
        true
    }

    /// Sliding extension: if more than [`TOUCH_DEBOUNCE_MS`] has elapsed
    /// since the last recorded touch, rewrite `issued_at`/`expires_at` in
    /// both tiers. A no-op inside the debounce window, and safe to call at
    /// any frequency.
    pub fn touch(&self) {
        let Some(mut session) = self.current() else {
            return;
        };

        let now = self.clock.now_ms();
        let last_touch = self
            .store
            .get_with_repair(keys::SESSION_TIMESTAMP)
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0);

        if now.saturating_sub(last_touch) <= TOUCH_DEBOUNCE_MS {
            return;
        }

        session.issued_at_ms = now;
        session.expires_at_ms = now.saturating_add(SESSION_DURATION_MS);

        let Ok(json) = serde_json::to_string(&session) else {
            return;
        };
        if let Err(e) = self
            .store
            .put_both(keys::SESSION, &json)
            .and_then(|()| self.store.put_both(keys::SESSION_TIMESTAMP, &now.to_string()))
        {
            tracing::warn!(error = %e, "session extension write failed");
            return;
        }
        tracing::debug!(expires_at_ms = session.expires_at_ms, "session extended");
    }

    /// Time until expiry, clamped at zero. Zero also when no session exists.
    #[must_use]
    pub fn remaining_ms(&self) -> u64 {
        self.current()
            .map_or(0, |s| s.expires_at_ms.saturating_sub(self.clock.now_ms()))
    }

    /// The derived key currently resident in the ephemeral tier, if any.
    ///
    /// An unparseable stored key reads as absent — the caller routes to
    /// recovery or PIN re-entry rather than operating on garbage.
    #[must_use]
    pub fn derived_key(&self) -> Option<DerivedKey> {
        let encoded = self.store.ephemeral().get(keys::DERIVED_KEY)?;
        match DerivedKey::decode(&encoded) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "stored derived key unparseable — treating as absent");
                None
            }
        }
    }

    /// Cold-start recovery: restore the ephemeral key from the durable
    /// backup, gated on a still-valid durable session.
    ///
    /// Protocol: if the ephemeral key is missing, (a) read the durable
    /// session record; (b) if still valid, copy the backup key into the
    /// ephemeral tier; (c) if the record is present but expired — or absent
    /// entirely — fail and require PIN re-entry.
    ///
    /// # Errors
    ///
    /// - [`VaultError::SessionExpired`] — no recoverable session; PIN required
    /// - [`VaultError::KeyUnrecoverable`] — valid session but no usable key
    ///   backup on this device (e.g. biometric-only state); PIN required
    /// - [`VaultError::Storage`] — the ephemeral tier rejected the restore
    pub fn attempt_recovery(&self) -> Result<Session, VaultError> {
        let session = self.current().ok_or(VaultError::SessionExpired)?;
        if self.clock.now_ms() > session.expires_at_ms {
            self.end();
            return Err(VaultError::SessionExpired);
        }

        if self.store.ephemeral().get(keys::DERIVED_KEY).is_none() {
            let backup = self
                .store
                .durable()
                .get(keys::BACKUP_DERIVED_KEY)
                .ok_or(VaultError::KeyUnrecoverable)?;
            // Validate before restoring — a corrupt backup must not be
            // promoted into the live tier.
            if let Err(e) = DerivedKey::decode(&backup) {
                tracing::warn!(error = %e, "key backup unparseable — recovery refused");
                return Err(VaultError::KeyUnrecoverable);
            }
            self.store.ephemeral().put(keys::DERIVED_KEY, &backup)?;
            tracing::info!("derived key restored from durable backup");
        }

        Ok(session)
    }

    /// Clear the session and every secret copy this manager owns: the
    /// record and touch timestamp in both tiers, the ephemeral key, and the
    /// durable key/salt backups. Idempotent — ending an already-ended
    /// session is a no-op.
    pub fn end(&self) {
        for result in [
            self.store.remove_both(keys::SESSION),
            self.store.remove_both(keys::SESSION_TIMESTAMP),
            self.store.ephemeral().remove(keys::DERIVED_KEY),
            self.store.durable().remove(keys::BACKUP_DERIVED_KEY),
            self.store.durable().remove(keys::BACKUP_SALT),
        ] {
            if let Err(e) = result {
                tracing::warn!(error = %e, "session teardown write failed");
            }
        }
        tracing::info!("session ended");
    }
}

// ---------------------------------------------------------------------------
// ExpiryTimer
// ---------------------------------------------------------------------------

/// One-shot timer that forces logout when the session lifetime runs out.
///
/// A background thread polls [`SessionManager::remaining_ms`] (so manual
/// clocks drive it in tests) and, on reaching zero, clears all session and
/// secret material before invoking the callback. Only one timer should be
/// active at a time: arming a replacement after [`SessionManager::start`]
/// is the caller's job, and dropping (or cancelling) the old timer retires
/// it. A timer-driven expiry racing a checker-driven one is harmless —
/// [`SessionManager::end`] is idempotent.
pub struct ExpiryTimer {
    cancel: Arc<AtomicBool>,
}

impl ExpiryTimer {
    /// Arm a one-shot timer for the current session's remaining lifetime.
    ///
    /// `on_expire` runs on the timer thread after the session has been
    /// cleared. If the session is already gone when the timer looks, it
    /// still fires once — the callback routes to re-authentication, which
    /// is the correct destination either way.
    pub fn arm<F>(session: Arc<SessionManager>, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        thread::spawn(move || {
            loop {
                if flag.load(Ordering::Relaxed) {
                    return;
                }
                let remaining = session.remaining_ms();
                if remaining == 0 {
                    break;
                }
                let sleep_ms = remaining.min(
                    u64::try_from(TIMER_CHECK_INTERVAL.as_millis()).unwrap_or(u64::MAX),
                );
                thread::sleep(Duration::from_millis(sleep_ms));
            }
            if flag.load(Ordering::Relaxed) {
                return;
            }
            tracing::info!("expiry timer fired — forcing logout");
            session.end();
            on_expire();
        });

        Self { cancel }
    }

    /// Retire the timer without firing. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
