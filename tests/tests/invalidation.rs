mod common;

use common::*;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use wms_realtime_core::{RealtimeConfig, RealtimeManager, RoutingTable};
use wms_realtime_proto::{CacheDomain, EventKind, Topic, TopicKey};

async fn connected(config: RealtimeConfig) -> (RealtimeManager, Arc<ScriptedTransport>, Arc<RecordingCache>, wms_realtime_core::SubscriptionGuard) {
    let (manager, transport) = manager(config);
    let cache = RecordingCache::new();
    let guard = manager.subscribe(cache.clone(), None);
    transport.last().subscribed();
    (manager, transport, cache, guard)
}

#[tokio::test(start_paused = true)]
async fn test_burst_coalesces_into_one_flush() {
    let (manager, transport, cache, _guard) = connected(RealtimeConfig::default()).await;
    let feed = transport.last();

    for _ in 0..20 {
        feed.change(Topic::Orders, EventKind::Update);
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(manager.pending_invalidations().len(), 1);
    assert!(cache.take().is_empty());

    sleep(Duration::from_millis(600)).await;
    assert_eq!(cache.take(), vec![CacheDomain::Orders, CacheDomain::Dashboard]);
    assert!(manager.pending_invalidations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_each_event_restarts_the_window() {
    let (_manager, transport, cache, _guard) = connected(RealtimeConfig::default()).await;
    let feed = transport.last();

    // steady trickle, never quiet for a full window
    for _ in 0..5 {
        feed.change(Topic::EventLogs, EventKind::Insert);
        sleep(Duration::from_millis(400)).await;
    }
    assert!(cache.take().is_empty());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(
        cache.take(),
        vec![CacheDomain::Dashboard, CacheDomain::RealtimeEvents, CacheDomain::EventLogs, CacheDomain::SystemLogs]
    );
}

#[tokio::test(start_paused = true)]
async fn test_keys_flush_independently() {
    let (manager, transport, cache, _guard) = connected(RealtimeConfig::default()).await;
    let feed = transport.last();

    feed.change(Topic::Orders, EventKind::Insert);
    sleep(Duration::from_millis(300)).await;
    feed.change(Topic::ShipmentRequests, EventKind::Update);
    feed.change(Topic::Orders, EventKind::Update);

    let pending: Vec<TopicKey> = manager.pending_invalidations().into_iter().map(|(key, _)| key).collect();
    assert_eq!(pending.len(), 3);

    // orders:insert is due first and is not held back by the later keys
    sleep(Duration::from_millis(250)).await;
    assert_eq!(cache.take(), vec![CacheDomain::Orders, CacheDomain::Dashboard]);
    assert_eq!(manager.pending_invalidations().len(), 2);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(cache.take().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_financial_insert_routes_to_financial_domains() {
    let (_manager, transport, cache, _guard) = connected(RealtimeConfig::default()).await;
    transport.last().change(Topic::FinancialDocuments, EventKind::Insert);

    sleep(Duration::from_secs(1)).await;
    let mut domains = cache.take();
    domains.sort();
    assert_eq!(domains, vec![CacheDomain::Dashboard, CacheDomain::FinancialDocuments, CacheDomain::FinancialSummary]);
}

#[tokio::test(start_paused = true)]
async fn test_shared_cache_invalidated_once() {
    let (manager, transport) = manager(RealtimeConfig::default());
    let shared = RecordingCache::new();
    let other = RecordingCache::new();
    let _a = manager.subscribe(shared.clone(), None);
    let _b = manager.subscribe(shared.clone(), None);
    let _c = manager.subscribe(other.clone(), None);
    transport.last().subscribed();

    transport.last().change(Topic::Orders, EventKind::Delete);
    sleep(Duration::from_secs(1)).await;

    assert_eq!(shared.take(), vec![CacheDomain::Orders, CacheDomain::Dashboard]);
    assert_eq!(other.take(), vec![CacheDomain::Orders, CacheDomain::Dashboard]);
}

#[tokio::test(start_paused = true)]
async fn test_custom_debounce_and_routes() {
    let config = RealtimeConfig::default()
        .with_debounce(Duration::from_millis(50))
        .with_routing(RoutingTable::new([(Topic::Orders, vec![CacheDomain::Orders])]));
    let (manager, transport, cache, _guard) = connected(config).await;

    assert_eq!(transport.last().topics, vec![Topic::Orders]);

    transport.last().change(Topic::Orders, EventKind::Insert);
    transport.last().change(Topic::EventLogs, EventKind::Insert);
    sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.take(), vec![CacheDomain::Orders]);
    assert!(manager.pending_invalidations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_flush_marks_subscribers_active() {
    let (manager, transport, _cache, _guard) = connected(RealtimeConfig::default()).await;
    let before = manager.subscribers()[0].last_activity_at;

    transport.last().change(Topic::Orders, EventKind::Insert);
    sleep(Duration::from_secs(1)).await;

    let after = manager.subscribers()[0].last_activity_at;
    assert!(after >= before);
    assert!(manager.status().last_event_at.is_some());
}
