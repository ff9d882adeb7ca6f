mod common;

use common::*;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use wms_realtime_core::{ConnectionState, RealtimeConfig};
use wms_realtime_proto::{EventKind, Topic};

#[tokio::test(start_paused = true)]
async fn test_idle_status() {
    let (manager, _transport) = manager(RealtimeConfig::default());
    let status = manager.status();

    assert_eq!(status.connection_state, ConnectionState::Disconnected);
    assert_eq!(status.subscriber_count, 0);
    assert_eq!(status.total_connections, 0);
    assert_eq!(status.average_latency_ms, 0.0);
    assert!(status.last_event_at.is_none());
    assert!(!status.is_live());
}

#[tokio::test(start_paused = true)]
async fn test_latency_is_averaged() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let _guard = manager.subscribe(RecordingCache::new(), None);

    sleep(Duration::from_millis(250)).await;
    transport.last().subscribed();
    assert_eq!(manager.status().average_latency_ms, 250.0);

    manager.force_reconnect();
    sleep(Duration::from_millis(750)).await;
    transport.last().subscribed();

    let status = manager.status();
    assert_eq!(status.average_latency_ms, 500.0);
    assert_eq!(status.total_connections, 2);
    assert_eq!(status.failed_connections, 0);
    assert!(status.is_live());
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_counted_and_described() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let _guard = manager.subscribe(RecordingCache::new(), None);

    transport.last().sink.status(wms_realtime_proto::ChannelStatus::TimedOut);
    let status = manager.status();
    assert_eq!(status.failed_connections, 1);
    assert_eq!(status.reconnect_attempt, 1);
    assert_eq!(status.last_error.as_deref(), Some("timed_out"));

    sleep(Duration::from_millis(1001)).await;
    transport.last().subscribed();
    let status = manager.status();
    assert_eq!(status.total_connections, 2);
    assert_eq!(status.failed_connections, 1);
    assert_eq!(status.reconnect_attempt, 0);
}

#[tokio::test(start_paused = true)]
async fn test_pending_invalidations_are_reported() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let _guard = manager.subscribe(RecordingCache::new(), None);
    transport.last().subscribed();

    transport.last().change(Topic::Orders, EventKind::Insert);
    transport.last().change(Topic::Orders, EventKind::Update);
    transport.last().change(Topic::Orders, EventKind::Update);
    assert_eq!(manager.status().pending_invalidation_count, 2);
    assert!(manager.status().last_event_at.is_some());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(manager.status().pending_invalidation_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_status_serializes_for_admin_tooling() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let _guard = manager.subscribe(RecordingCache::new(), None);
    transport.last().subscribed();

    let json = serde_json::to_value(manager.status()).unwrap();
    assert_eq!(json["connection_state"], "connected");
    assert_eq!(json["subscriber_count"], 1);
    assert_eq!(json["retries_exhausted"], false);
}

#[tokio::test(start_paused = true)]
async fn test_wait_connected() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let _guard = manager.subscribe(RecordingCache::new(), None);

    let waiter = tokio::spawn({
        let manager = manager.clone();
        async move { manager.wait_connected().await }
    });
    sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    transport.last().subscribed();
    timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
}
