//! Integration tests against a running Redis server.
//!
//! Run with `cargo test -p sidstore-redis -- --ignored`. The server address
//! comes from `REDIS_ADDR` (default `127.0.0.1:6379`); tests use database 15.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration;
use deadpool_redis::redis::AsyncCommands;
use sidstore_core::{
    Backend, Clock, Fetched, Record, SessionConfig, SessionId, SessionManager, Value, codec,
    mocks::ManualClock,
};
use sidstore_redis::{RedisBackend, RedisOptions};
use std::sync::Arc;

fn options() -> RedisOptions {
    let addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    RedisOptions::parse(&format!(
        r#"{{"addr": "{addr}", "db": 15, "prefix": "sidstore-test:"}}"#
    ))
}

fn backend() -> (RedisBackend, ManualClock) {
    let clock = ManualClock::new(chrono::Utc::now());
    let backend = RedisBackend::with_clock(&options(), Arc::new(clock.clone())).unwrap();
    (backend, clock)
}

fn detached(fetched: Option<Fetched>) -> Record {
    match fetched {
        Some(Fetched::Detached(record)) => record,
        other => panic!("expected detached record, got {other:?}"),
    }
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_set_get_delete() {
    let (backend, clock) = backend();
    backend.ping().await.unwrap();

    let id = SessionId::new();
    let mut record = Record::new(clock.now() + Duration::minutes(5));
    record.insert("hello", "world");
    record.push_flash("saved");
    backend.set(id, record.clone(), Duration::minutes(5)).await.unwrap();

    assert_eq!(detached(backend.get(id).await.unwrap()), record);

    backend.delete(id).await.unwrap();
    assert!(backend.get(id).await.unwrap().is_none());
    backend.delete(id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_expired_record_is_deleted_on_get() {
    let (backend, clock) = backend();
    let id = SessionId::new();
    // No TTL, so only the record's own expiry can evict it.
    backend
        .set(id, Record::new(clock.now() + Duration::seconds(5)), Duration::zero())
        .await
        .unwrap();

    clock.advance(Duration::seconds(6));
    assert!(backend.get(id).await.unwrap().is_none());

    clock.set(clock.now() - Duration::seconds(6));
    assert!(backend.get(id).await.unwrap().is_none(), "expired key was not deleted");
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_expired_read_does_not_delete_refreshed_record() {
    let (backend, clock) = backend();
    let id = SessionId::new();
    let stale = Record::new(clock.now() + Duration::seconds(5));
    backend.set(id, stale.clone(), Duration::seconds(5)).await.unwrap();
    let stale_bytes = codec::serialize(&stale).unwrap();

    // One request sees the record after it expired...
    clock.advance(Duration::seconds(6));

    // ...while another commits a refresh before the expired delete runs.
    let mut refreshed = stale;
    refreshed.set_expires_at(clock.now() + Duration::minutes(10));
    backend.set(id, refreshed.clone(), Duration::minutes(10)).await.unwrap();

    assert!(!backend.delete_if_unchanged(id, &stale_bytes).await.unwrap());
    assert_eq!(detached(backend.get(id).await.unwrap()), refreshed);

    let current = codec::serialize(&refreshed).unwrap();
    assert!(backend.delete_if_unchanged(id, &current).await.unwrap());
    assert!(backend.get(id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_corrupt_payload_is_a_miss() {
    let (backend, _clock) = backend();
    let id = SessionId::new();

    let pool = deadpool_redis::Config::from_url(options().to_url())
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .unwrap();
    let mut conn = pool.get().await.unwrap();
    let _: () = conn.set_ex(backend.key(id), b"garbage".as_slice(), 60).await.unwrap();

    assert!(backend.get(id).await.unwrap().is_none());
    backend.delete(id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_subsecond_ttl_still_expires() {
    let (backend, clock) = backend();
    let id = SessionId::new();
    backend
        .set(id, Record::new(clock.now() + Duration::milliseconds(400)), Duration::milliseconds(400))
        .await
        .unwrap();

    let pool = deadpool_redis::Config::from_url(options().to_url())
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .unwrap();
    let mut conn = pool.get().await.unwrap();
    let ttl: i64 = conn.ttl(backend.key(id)).await.unwrap();
    assert_eq!(ttl, 1, "key stored without an expiry");
    backend.delete(id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_lifecycle_through_registry() {
    sidstore_redis::register();
    let options = options();
    let backend_options = format!(
        r#"{{"addr": "{}", "db": {}, "prefix": "{}"}}"#,
        options.addr, options.db, options.prefix
    );
    let manager = SessionManager::open(
        SessionConfig::new("secret123").with_backend("redis", backend_options),
    )
    .unwrap();

    let mut first = manager.handle(None);
    first.set_key("hello", "world").unwrap();
    first.add_flash("welcome").unwrap();
    let cookie = first.finish().await.unwrap();

    let mut second = manager.handle(Some(&cookie.value));
    assert!(second.init().await.unwrap());
    assert_eq!(second.get("hello").unwrap(), Some(Value::from("world")));
    assert_eq!(second.flashes().unwrap(), vec![Value::from("welcome")]);
    assert!(second.should_persist());
    second.finish().await;

    let mut third = manager.handle(Some(&cookie.value));
    assert!(third.init().await.unwrap());
    assert!(third.flashes().unwrap().is_empty());
    third.clear().await.unwrap();

    let mut fourth = manager.handle(Some(&cookie.value));
    assert!(!fourth.init().await.unwrap());
}
