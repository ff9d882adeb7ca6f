mod common;

use common::*;
use std::time::Duration;
use tokio::time::sleep;
use wms_realtime_core::{ConnectionState, RealtimeConfig, SubscriberId};
use wms_realtime_proto::{CacheDomain, EventKind, Topic};

#[tokio::test(start_paused = true)]
async fn test_dispose_is_idempotent() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let guard = manager.subscribe(RecordingCache::new(), None);
    let _other = manager.subscribe(RecordingCache::new(), None);

    guard.dispose();
    guard.dispose();
    assert!(guard.is_disposed());
    assert_eq!(manager.status().subscriber_count, 1);

    drop(guard);
    assert_eq!(manager.status().subscriber_count, 1);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reused_id_replaces_cache() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let old_cache = RecordingCache::new();
    let new_cache = RecordingCache::new();

    let first = manager.subscribe(old_cache.clone(), Some(SubscriberId::from("orders-table")));
    let registered_at = manager.subscribers()[0].registered_at;
    let second = manager.subscribe(new_cache.clone(), Some(SubscriberId::from("orders-table")));
    transport.last().subscribed();

    let subscribers = manager.subscribers();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].id.as_str(), "orders-table");
    assert_eq!(subscribers[0].registered_at, registered_at);

    transport.last().change(Topic::Orders, EventKind::Insert);
    sleep(Duration::from_secs(1)).await;
    assert!(old_cache.take().is_empty());
    assert_eq!(new_cache.take(), vec![CacheDomain::Orders, CacheDomain::Dashboard]);

    // the entry belongs to the newest registration
    first.dispose();
    assert_eq!(manager.status().subscriber_count, 1);
    second.dispose();
    assert_eq!(manager.status().subscriber_count, 0);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reassigned_guard_keeps_connection_alive() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let id = SubscriberId::from("orders-table");
    let mut guard = manager.subscribe(RecordingCache::new(), Some(id.clone()));
    transport.last().subscribed();

    let cache = RecordingCache::new();
    guard = manager.subscribe(cache.clone(), Some(id));
    assert!(!guard.is_disposed());
    assert_eq!(manager.status().subscriber_count, 1);

    transport.last().change(Topic::Orders, EventKind::Update);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.take(), vec![CacheDomain::Orders, CacheDomain::Dashboard]);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(manager.status().connection_state, ConnectionState::Connected);
    assert_eq!(manager.status().subscriber_count, 1);
    assert_eq!(transport.close_count(), 0);
    drop(guard);
}

#[tokio::test(start_paused = true)]
async fn test_generated_ids_are_unique() {
    let (manager, _transport) = manager(RealtimeConfig::default());
    let a = manager.subscribe(RecordingCache::new(), None);
    let b = manager.subscribe(RecordingCache::new(), None);

    assert_ne!(a.id(), b.id());
    assert!(a.id().as_str().starts_with("S-"));
    assert_eq!(manager.subscribers().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_churn_within_grace_keeps_connection() {
    let (manager, transport) = manager(RealtimeConfig::default().with_grace_period(Duration::from_secs(5)));
    let mut state = manager.state();
    let mut guard = manager.subscribe(RecordingCache::new(), None);
    transport.last().subscribed();
    assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);

    for _ in 0..10 {
        drop(guard);
        sleep(Duration::from_secs(4)).await;
        guard = manager.subscribe(RecordingCache::new(), None);
    }

    assert!(!state.has_changed().unwrap());
    assert_eq!(transport.open_count(), 1);
    drop(guard);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}
