//! Concurrent access to one session on the memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::Duration;
use sidstore_core::{
    Backend, Clock, MemoryBackend, Record, SessionConfig, SessionId, SessionManager, Value,
    mocks::ManualClock,
};
use std::sync::Arc;

const WRITERS: usize = 32;

fn manager() -> (SessionManager, ManualClock) {
    let clock = ManualClock::default();
    let manager =
        SessionManager::open_with_clock(SessionConfig::new("secret123"), Arc::new(clock.clone()))
            .expect("memory backend is always registered");
    (manager, clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_set_key_loses_no_keys() {
    let (manager, _) = manager();

    let mut seed = manager.handle(None);
    seed.set_key("seed", true).unwrap();
    let cookie = seed.finish().await.unwrap().value;

    let tasks: Vec<_> = (0..WRITERS)
        .map(|i| {
            let manager = manager.clone();
            let cookie = cookie.clone();
            tokio::spawn(async move {
                let mut session = manager.handle(Some(&cookie));
                assert!(session.init().await.unwrap());
                session.set_key(format!("writer-{i}"), i64::try_from(i).unwrap()).unwrap();
                session.set_key("last", i64::try_from(i).unwrap()).unwrap();
                session.finish().await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let mut check = manager.handle(Some(&cookie));
    assert!(check.init().await.unwrap());
    assert_eq!(check.get("seed").unwrap(), Some(Value::Bool(true)));
    for i in 0..WRITERS {
        assert_eq!(
            check.get(&format!("writer-{i}")).unwrap(),
            Some(Value::Int(i64::try_from(i).unwrap())),
            "lost key of writer {i}"
        );
    }
    // Last write wins, whichever writer that was.
    assert!(check.get("last").unwrap().and_then(|v| v.as_i64()).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_flash_readers_drain_once() {
    let (manager, _) = manager();

    let mut post = manager.handle(None);
    for n in 0..10_i64 {
        post.add_flash(n).unwrap();
    }
    let cookie = post.finish().await.unwrap().value;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let cookie = cookie.clone();
            tokio::spawn(async move {
                let mut session = manager.handle(Some(&cookie));
                assert!(session.init().await.unwrap());
                session.flashes().unwrap()
            })
        })
        .collect();

    let mut seen = Vec::new();
    for task in tasks {
        let drained = task.await.unwrap();
        assert!(drained.is_empty() || drained.len() == 10);
        seen.extend(drained);
    }
    assert_eq!(seen, (0..10_i64).map(Value::from).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_get_after_refresh_commits_keeps_record() {
    let clock = ManualClock::default();
    let backend = MemoryBackend::with_clock(Arc::new(clock.clone()));
    let id = SessionId::new();
    backend
        .set(id, Record::new(clock.now() + Duration::seconds(5)), Duration::seconds(5))
        .await
        .unwrap();

    let Some(sidstore_core::Fetched::Resident(resident)) = backend.get(id).await.unwrap() else {
        unreachable!("memory backend hands out resident records");
    };
    clock.advance(Duration::seconds(4));
    resident
        .write(|record| record.set_expires_at(record.expires_at() + Duration::seconds(60)))
        .unwrap();

    // Past the original expiry, before the refreshed one.
    clock.advance(Duration::seconds(2));
    let readers: Vec<_> = (0..16)
        .map(|_| {
            let backend = backend.clone();
            tokio::spawn(async move { backend.get(id).await.unwrap().is_some() })
        })
        .collect();
    for reader in readers {
        assert!(reader.await.unwrap());
    }
    assert_eq!(backend.len().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_racing_refresh_never_deletes_a_refreshed_record() {
    for _ in 0..50 {
        let (manager, clock) = manager();

        let mut seed = manager.handle(None);
        seed.create(5);
        let cookie = seed.finish().await.unwrap().value;

        let mut refresher = manager.handle(Some(&cookie));
        assert!(refresher.init().await.unwrap());

        // The stored record is now expired; readers may evict it, unless the
        // refresh commits first.
        clock.advance(Duration::seconds(6));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                let cookie = cookie.clone();
                tokio::spawn(async move {
                    let mut session = manager.handle(Some(&cookie));
                    session.init().await.unwrap()
                })
            })
            .collect();
        refresher.refresh(Duration::minutes(10)).unwrap();
        let refreshed = refresher.expires_at().unwrap().is_some();
        for reader in readers {
            reader.await.unwrap();
        }

        let mut after = manager.handle(Some(&cookie));
        assert_eq!(after.init().await.unwrap(), refreshed);
    }
}
