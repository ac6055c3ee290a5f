#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the auth-failure interceptor — exactly-once
//! session teardown under concurrent failing calls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use clasp_vault::remote::{InterceptedStore, RemoteError, RemoteStore};
use clasp_vault::store::keys;

mod common;
use common::{memory_session, test_key, test_salt, MockRemote};

fn intercepted(
    remote: Arc<MockRemote>,
) -> (
    Arc<clasp_vault::session::SessionManager>,
    Arc<AtomicU32>,
    Arc<InterceptedStore<Arc<MockRemote>>>,
) {
    let (_clock, session) = memory_session();
    session
        .start("p-1", "user@example.com", &test_key(), &test_salt())
        .expect("start");
    let expirations = Arc::new(AtomicU32::new(0));
    let observed = Arc::clone(&expirations);
    let store = Arc::new(InterceptedStore::new(
        remote,
        Arc::clone(&session),
        move || {
            observed.fetch_add(1, Ordering::SeqCst);
        },
    ));
    (session, expirations, store)
}

#[test]
fn auth_failure_ends_session_and_fires_hook_once() {
    let remote = Arc::new(MockRemote::new());
    let (session, expirations, store) = intercepted(Arc::clone(&remote));

    remote.fail_next(RemoteError::TokenExpired);
    let result = store.list_entries("p-1");
    assert!(matches!(result, Err(RemoteError::TokenExpired)));

    assert!(!session.is_valid());
    assert!(session.derived_key().is_none());
    assert_eq!(expirations.load(Ordering::SeqCst), 1);
    assert!(store.has_tripped());
}

#[test]
fn non_auth_errors_pass_through_untouched() {
    let remote = Arc::new(MockRemote::new());
    let (session, expirations, store) = intercepted(Arc::clone(&remote));

    remote.fail_next(RemoteError::Network("down".into()));
    assert!(matches!(
        store.list_entries("p-1"),
        Err(RemoteError::Network(_))
    ));
    remote.fail_next(RemoteError::Backend("500".into()));
    assert!(matches!(
        store.list_entries("p-1"),
        Err(RemoteError::Backend(_))
    ));

    assert!(session.is_valid());
    assert_eq!(expirations.load(Ordering::SeqCst), 0);
    assert!(!store.has_tripped());
}

#[test]
fn concurrent_auth_failures_fire_exactly_once() {
    let remote = Arc::new(MockRemote::new());
    let (session, expirations, store) = intercepted(Arc::clone(&remote));

    remote.fail_times(&RemoteError::Unauthorized, 8);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let _ = store.list_entries("p-1");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    assert_eq!(
        expirations.load(Ordering::SeqCst),
        1,
        "eight concurrent failures must navigate once"
    );
    assert!(!session.is_valid());
}

#[test]
fn latch_reopens_after_new_session() {
    let remote = Arc::new(MockRemote::new());
    let (session, expirations, store) = intercepted(Arc::clone(&remote));

    remote.fail_next(RemoteError::Unauthorized);
    let _ = store.list_entries("p-1");
    assert_eq!(expirations.load(Ordering::SeqCst), 1);

    // The user signs back in; the latch re-opens for the next incident.
    session
        .start("p-1", "user@example.com", &test_key(), &test_salt())
        .expect("restart");
    store.notify_session_started();
    assert!(!store.has_tripped());

    remote.fail_next(RemoteError::SessionMissing);
    let _ = store.list_entries("p-1");
    assert_eq!(expirations.load(Ordering::SeqCst), 2);
    assert!(!session.is_valid());
}

#[test]
fn successful_calls_do_not_touch_the_session_record() {
    let remote = Arc::new(MockRemote::new());
    let (session, expirations, store) = intercepted(remote);

    let before = session
        .store()
        .ephemeral()
        .get(keys::SESSION)
        .expect("session record");
    store.list_entries("p-1").expect("list");
    let after = session
        .store()
        .ephemeral()
        .get(keys::SESSION)
        .expect("session record");

    assert_eq!(before, after);
    assert_eq!(expirations.load(Ordering::SeqCst), 0);
}

#[test]
fn write_failures_trip_the_interceptor_too() {
    let remote = Arc::new(MockRemote::new());
    let (session, expirations, store) = intercepted(Arc::clone(&remote));

    remote.fail_next(RemoteError::Unauthorized);
    assert!(store.insert_entry("p-1", "blob").is_err());

    assert!(!session.is_valid());
    assert_eq!(expirations.load(Ordering::SeqCst), 1);
}
