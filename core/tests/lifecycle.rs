//! Integration tests for the request lifecycle on the memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::Duration;
use sidstore_core::{
    Clock, SessionConfig, SessionError, SessionManager, SessionState, Value, mocks::ManualClock,
    registry,
};
use std::sync::Arc;

/// Manager on the memory backend driven by a manual clock.
fn manager() -> (SessionManager, ManualClock) {
    let clock = ManualClock::default();
    let manager =
        SessionManager::open_with_clock(SessionConfig::new("secret123"), Arc::new(clock.clone()))
            .expect("memory backend is always registered");
    (manager, clock)
}

#[tokio::test]
async fn test_short_lived_session_expires() {
    let (manager, clock) = manager();

    let mut session = manager.handle(None);
    session.create(5);
    assert_eq!(
        session.expires_at().unwrap(),
        Some(clock.now() + Duration::seconds(5))
    );
    let cookie = session.finish().await.expect("new session emits a cookie");
    assert_eq!(cookie.expires, clock.now() + Duration::seconds(5));

    clock.advance(Duration::seconds(6));

    let mut later = manager.handle(Some(&cookie.value));
    assert!(!later.init().await.unwrap());
    assert_eq!(later.state(), SessionState::Absent);
    assert!(manager.backend().get(later.id().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_value_survives_to_next_request() {
    let (manager, _) = manager();

    let mut first = manager.handle(None);
    assert!(!first.init().await.unwrap());
    first.set_key("hello", "world").unwrap();
    first.set_store().await.unwrap();
    let cookie = first.save().unwrap().expect("bound session has a cookie");

    let mut second = manager.handle(Some(&cookie.value));
    assert!(second.init().await.unwrap());
    assert_eq!(second.get("hello").unwrap(), Some(Value::from("world")));
}

#[tokio::test]
async fn test_cleared_cookie_no_longer_resolves() {
    let (manager, clock) = manager();

    let mut first = manager.handle(None);
    first.set_key("user", "alice").unwrap();
    let cookie = first.finish().await.unwrap();

    let mut second = manager.handle(Some(&cookie.value));
    assert!(second.init().await.unwrap());
    let removal = second.clear().await.unwrap();
    assert!(removal.is_removal(clock.now()));
    assert!(removal.to_string().contains("Max-Age=0"));

    let mut third = manager.handle(Some(&cookie.value));
    assert!(!third.init().await.unwrap());
}

#[test]
fn test_unknown_backend_is_a_value_not_a_crash() {
    let result = registry::open("bogus", "");
    assert!(matches!(&result, Err(SessionError::UnknownBackend(name)) if name == "bogus"));
    assert!(result.err().unwrap().is_fatal_at_startup());

    let config = SessionConfig::new("secret123").with_backend("bogus", "{}");
    assert!(matches!(
        SessionManager::open(config),
        Err(SessionError::UnknownBackend(_))
    ));
}

#[tokio::test]
async fn test_flashes_are_read_by_exactly_one_request() {
    let (manager, _) = manager();

    let mut post = manager.handle(None);
    post.add_flash("Profile saved").unwrap();
    post.add_flash("Welcome back").unwrap();
    post.add_flash(3).unwrap();
    let cookie = post.finish().await.unwrap();

    let mut redirect = manager.handle(Some(&cookie.value));
    assert!(redirect.init().await.unwrap());
    assert_eq!(
        redirect.flashes().unwrap(),
        vec![
            Value::from("Profile saved"),
            Value::from("Welcome back"),
            Value::Int(3)
        ]
    );
    assert!(redirect.flashes().unwrap().is_empty());
    redirect.finish().await;

    let mut reload = manager.handle(Some(&cookie.value));
    assert!(reload.init().await.unwrap());
    assert!(reload.flashes().unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_extends_stored_expiry() {
    let (manager, clock) = manager();

    let mut first = manager.handle(None);
    first.create(10);
    let cookie = first.finish().await.unwrap();

    clock.advance(Duration::seconds(8));
    let mut second = manager.handle(Some(&cookie.value));
    assert!(second.init().await.unwrap());
    second.refresh(Duration::seconds(60)).unwrap();
    let refreshed = second.finish().await.expect("refresh emits a new cookie");
    assert_eq!(refreshed.value, cookie.value);
    assert_eq!(refreshed.expires, cookie.expires + Duration::seconds(60));

    clock.advance(Duration::seconds(30));
    let mut third = manager.handle(Some(&cookie.value));
    assert!(third.init().await.unwrap());
}

#[tokio::test]
async fn test_del_store_removes_session_immediately() {
    let (manager, _) = manager();

    let mut first = manager.handle(None);
    first.set_key("k", "v").unwrap();
    let cookie = first.finish().await.unwrap();

    let mut second = manager.handle(Some(&cookie.value));
    assert!(second.init().await.unwrap());
    second.del_store().await.unwrap();
    assert!(!second.should_persist());
    assert_eq!(second.finish().await, None);

    let mut third = manager.handle(Some(&cookie.value));
    assert!(!third.init().await.unwrap());
}

#[tokio::test]
async fn test_tampered_cookie_starts_fresh_session() {
    let (manager, _) = manager();

    let mut first = manager.handle(None);
    first.set_key("role", "user").unwrap();
    let cookie = first.finish().await.unwrap();
    let original_id = first.id().unwrap();

    let flipped = if cookie.value.starts_with('0') { '1' } else { '0' };
    let tampered = format!("{flipped}{}", &cookie.value[1..]);

    let mut second = manager.handle(Some(&tampered));
    assert!(!second.init().await.unwrap());
    assert_eq!(second.state(), SessionState::Unbound);
    assert_eq!(second.get("role").unwrap(), None);

    second.set_key("role", "admin").unwrap();
    assert_ne!(second.id().unwrap(), original_id);
}
