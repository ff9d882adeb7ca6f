use std::sync::{Arc, Mutex, Weak};

use strum::Display;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::{debug, error, info, trace, warn};
use wms_realtime_proto::{ChangeEvent, ChannelStatus, Topic, TopicKey};

use crate::{
    cache::CacheHandle,
    config::RealtimeConfig,
    debounce::DebounceScheduler,
    metrics::{Metrics, Readings, RealtimeStatus},
    reconnect::{Backoff, ReconnectPolicy},
    registry::{RegistryHooks, SubscriberId, SubscriberInfo, SubscriberRegistry, SubscriptionGuard},
    router::InvalidationRouter,
    state::{ConnectionState, Lifecycle},
    transport::{ChangeTransport, ChannelHandle, ConnectionEvents, ConnectionId, TransportSink},
};

/// Host-environment events that call for a fresh connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ExternalTrigger {
    /// The page or app became visible again. Only reconnects if not currently connected.
    VisibilityRegained,
    TokenRefreshed,
    SignedIn,
}

#[derive(Debug, Clone, Copy)]
enum ConnectReason {
    /// A subscriber registered; only acts from `disconnected`
    Demand,
    /// Backoff timer for the given failed attempt fired
    Retry(ConnectionId),
    Forced,
}

struct Connection {
    lifecycle: Lifecycle,
    handle: Option<Box<dyn ChannelHandle>>,
    retry_timer: Option<JoinHandle<()>>,
}

impl Connection {
    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
            debug!("pending reconnect cancelled");
        }
    }
}

struct Inner {
    channel_name: String,
    topics: Vec<Topic>,
    policy: ReconnectPolicy,
    transport: Arc<dyn ChangeTransport>,
    router: InvalidationRouter,
    registry: SubscriberRegistry,
    debounce: DebounceScheduler,
    connection: Mutex<Connection>,
    metrics: Mutex<Metrics>,
    state: watch::Sender<ConnectionState>,
    weak_self: Weak<Inner>,
}

/// Owns the single change-feed subscription and fans its notifications out as query-cache
/// invalidations.
///
/// Consumers register with [`subscribe`](Self::subscribe) and hold the returned guard for as long
/// as they want live updates. The first registration connects; the connection is released a grace
/// period after the last guard is dropped. Incoming change events are debounced per topic and
/// event kind, routed to cache domains and invalidated in every registered cache.
///
/// Transport failures are retried with exponential backoff. They are logged, never returned to
/// consumers; observe them through [`status`](Self::status) or [`state`](Self::state).
///
/// Construct one per process (it is cheap to clone) and call [`global_cleanup`](Self::global_cleanup)
/// on shutdown. Construction and registration must happen within a tokio runtime.
#[derive(Clone)]
pub struct RealtimeManager {
    inner: Arc<Inner>,
}

impl RealtimeManager {
    pub fn new(config: RealtimeConfig, transport: Arc<dyn ChangeTransport>) -> Self {
        let router = InvalidationRouter::new(config.routing);
        let topics = router.table().topics();
        info!("Creating realtime manager for channel {} ({} topics)", config.channel_name, topics.len());

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let hooks: Weak<dyn RegistryHooks> = weak.clone();
            let flush_target = weak.clone();
            Inner {
                channel_name: config.channel_name,
                topics,
                policy: config.reconnect,
                transport,
                router,
                registry: SubscriberRegistry::new(config.grace_period, hooks),
                debounce: DebounceScheduler::new(config.debounce, move |key| {
                    if let Some(inner) = flush_target.upgrade() {
                        inner.flush(key);
                    }
                }),
                connection: Mutex::new(Connection { lifecycle: Lifecycle::new(), handle: None, retry_timer: None }),
                metrics: Mutex::new(Metrics::default()),
                state,
                weak_self: weak.clone(),
            }
        });
        Self { inner }
    }

    /// Register interest in live updates for `cache`. Dropping or disposing the guard unregisters.
    pub fn subscribe(&self, cache: CacheHandle, id: Option<SubscriberId>) -> SubscriptionGuard { self.inner.registry.register(cache, id) }

    /// Discard the current attempt and any pending backoff and connect afresh.
    ///
    /// With no subscribers nothing is opened; an errored connection is torn down instead so the
    /// next registration starts from a clean retry budget.
    pub fn force_reconnect(&self) { self.inner.force_reconnect(); }

    pub fn handle_trigger(&self, trigger: ExternalTrigger) {
        let state = *self.inner.state.borrow();
        match trigger {
            ExternalTrigger::VisibilityRegained if state == ConnectionState::Connected => {
                trace!("visibility regained while connected, nothing to do");
            }
            trigger => {
                info!("{} while {}, reconnecting", trigger, state);
                self.inner.force_reconnect();
            }
        }
    }

    /// Drop all subscribers, pending invalidations and the connection. For process teardown.
    pub fn global_cleanup(&self) {
        let removed = self.inner.registry.clear();
        let discarded = self.inner.debounce.cancel_all();
        self.inner.teardown();
        info!("Realtime cleanup removed {} subscribers and dropped {} pending invalidations", removed, discarded);
    }

    pub fn status(&self) -> RealtimeStatus {
        let readings = {
            let connection = self.inner.connection.lock().expect("Failed to lock connection");
            Readings {
                connection_state: connection.lifecycle.state(),
                subscriber_count: self.inner.registry.len(),
                reconnect_attempt: connection.lifecycle.attempt(),
                retries_exhausted: connection.lifecycle.is_exhausted(),
                pending_invalidation_count: self.inner.debounce.pending_count(),
            }
        };
        let metrics = self.inner.metrics.lock().expect("Failed to lock metrics");
        RealtimeStatus::project(readings, &metrics)
    }

    /// Connection state as a watch channel
    pub fn state(&self) -> watch::Receiver<ConnectionState> { self.inner.state.subscribe() }

    /// Wait until the connection is live. Does not return while retries are exhausted; wrap in a
    /// timeout if that matters.
    pub async fn wait_connected(&self) {
        let mut state = self.state();
        let _ = state.wait_for(|state| *state == ConnectionState::Connected).await;
    }

    pub fn subscribers(&self) -> Vec<SubscriberInfo> { self.inner.registry.snapshot() }

    pub fn pending_invalidations(&self) -> Vec<(TopicKey, chrono::DateTime<chrono::Utc>)> { self.inner.debounce.pending() }

    pub fn channel_name(&self) -> &str { &self.inner.channel_name }
}

impl Inner {
    /// Publish under the connection lock so observers see transitions in order
    fn publish(&self, connection: &Connection) { self.state.send_replace(connection.lifecycle.state()); }

    fn connect(&self, reason: ConnectReason) {
        let (id, previous) = {
            let mut connection = self.connection.lock().expect("Failed to lock connection");
            let now = Instant::now();
            let id = match reason {
                ConnectReason::Demand => {
                    if connection.lifecycle.state() != ConnectionState::Disconnected {
                        trace!("connection already {}, not connecting", connection.lifecycle.state());
                        return;
                    }
                    connection.lifecycle.begin_connect(now)
                }
                ConnectReason::Retry(failed) => {
                    if connection.lifecycle.current() != Some(failed) || connection.lifecycle.state() != ConnectionState::Error {
                        debug!("retry for {} no longer applies", failed);
                        return;
                    }
                    connection.lifecycle.begin_connect(now)
                }
                ConnectReason::Forced => Ok(connection.lifecycle.force_connect(now)),
            };
            let id = match id {
                Ok(id) => id,
                Err(e) => {
                    debug!("not connecting: {}", e);
                    return;
                }
            };
            connection.cancel_retry();
            let previous = connection.handle.take();
            self.publish(&connection);
            (id, previous)
        };

        if let Some(previous) = previous {
            debug!("closing superseded channel handle");
            previous.close();
        }

        self.metrics.lock().expect("Failed to lock metrics").record_attempt();
        info!("Connecting to channel {} as {} ({:?})", self.channel_name, id, reason);

        let target: Weak<dyn ConnectionEvents> = self.weak_self.clone();
        match self.transport.open(&self.channel_name, &self.topics, TransportSink::new(id, target)) {
            Ok(handle) => {
                let mut connection = self.connection.lock().expect("Failed to lock connection");
                let live = connection.lifecycle.current() == Some(id)
                    && matches!(connection.lifecycle.state(), ConnectionState::Connecting | ConnectionState::Connected);
                if live {
                    connection.handle = Some(handle);
                } else {
                    drop(connection);
                    debug!("{} ended before open returned, closing its handle", id);
                    handle.close();
                }
            }
            Err(e) => self.fail(id, e.to_string()),
        }
    }

    fn connected(&self, id: ConnectionId) {
        let latency = {
            let mut connection = self.connection.lock().expect("Failed to lock connection");
            match connection.lifecycle.connected(id, Instant::now()) {
                Ok(latency) => {
                    self.publish(&connection);
                    latency
                }
                Err(e) => {
                    debug!("ignoring subscribed status: {}", e);
                    return;
                }
            }
        };
        self.metrics.lock().expect("Failed to lock metrics").record_connected(latency);
        info!("Connected to channel {} as {} in {:?}", self.channel_name, id, latency);
    }

    fn fail(&self, id: ConnectionId, reason: String) {
        let handle = {
            let mut connection = self.connection.lock().expect("Failed to lock connection");
            let attempt = match connection.lifecycle.failed(id) {
                Ok(attempt) => attempt,
                Err(e) => {
                    debug!("ignoring failure ({}): {}", reason, e);
                    return;
                }
            };
            self.publish(&connection);
            self.metrics.lock().expect("Failed to lock metrics").record_failure(reason.as_str());
            warn!("Channel {} connection {} failed (attempt {}): {}", self.channel_name, id, attempt, reason);

            match self.policy.delay(attempt) {
                Backoff::Exhausted => {
                    connection.lifecycle.mark_exhausted();
                    connection.cancel_retry();
                    error!(
                        "Channel {} gave up after {} attempts; live updates stay off until a forced reconnect",
                        self.channel_name, self.policy.max_attempts
                    );
                }
                Backoff::Retry(delay) => {
                    info!("Retrying channel {} in {:?}", self.channel_name, delay);
                    let weak = self.weak_self.clone();
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(inner) = weak.upgrade() {
                            inner.retry(id);
                        }
                    });
                    if let Some(previous) = connection.retry_timer.replace(timer) {
                        previous.abort();
                    }
                }
            }
            connection.handle.take()
        };

        if let Some(handle) = handle {
            handle.close();
        }
    }

    fn retry(&self, failed: ConnectionId) {
        {
            let mut connection = self.connection.lock().expect("Failed to lock connection");
            if connection.lifecycle.current() != Some(failed) || connection.lifecycle.state() != ConnectionState::Error {
                return;
            }
            connection.retry_timer.take();
            if self.registry.is_empty() {
                connection.lifecycle.disconnect();
                self.publish(&connection);
                info!("No subscribers left, not retrying channel {}", self.channel_name);
                return;
            }
        }
        self.connect(ConnectReason::Retry(failed));
    }

    fn force_reconnect(&self) {
        if self.registry.is_empty() {
            let handle = {
                let mut connection = self.connection.lock().expect("Failed to lock connection");
                connection.cancel_retry();
                if connection.lifecycle.state() != ConnectionState::Error {
                    debug!("forced reconnect with no subscribers, nothing to do");
                    return;
                }
                self.disconnect_locked(&mut connection)
            };
            if let Some(handle) = handle {
                handle.close();
            }
            info!("Forced reconnect with no subscribers reset channel {}", self.channel_name);
            return;
        }
        self.connect(ConnectReason::Forced);
    }

    /// Close the connection and reset to `disconnected`
    fn teardown(&self) {
        let handle = {
            let mut connection = self.connection.lock().expect("Failed to lock connection");
            self.disconnect_locked(&mut connection)
        };
        if let Some(handle) = handle {
            handle.close();
        }
    }

    /// Caller closes the returned handle once the lock is released
    fn disconnect_locked(&self, connection: &mut Connection) -> Option<Box<dyn ChannelHandle>> {
        connection.cancel_retry();
        if let Some(id) = connection.lifecycle.disconnect() {
            info!("Disconnecting channel {} ({})", self.channel_name, id);
        }
        self.publish(connection);
        connection.handle.take()
    }

    fn flush(&self, key: TopicKey) {
        let predicates = self.router.route(key);
        if predicates.is_empty() {
            trace!("no routes for {}", key);
            return;
        }
        let caches = self.registry.touch_all();
        debug!("{} invalidates {} domains across {} caches", key, predicates.len(), caches.len());
        for cache in caches {
            for predicate in &predicates {
                cache.invalidate(predicate);
            }
        }
    }
}

impl ConnectionEvents for Inner {
    fn on_status(&self, connection: ConnectionId, status: ChannelStatus) {
        match status {
            ChannelStatus::Subscribed => self.connected(connection),
            failure => self.fail(connection, failure.to_string()),
        }
    }

    fn on_change(&self, connection: ConnectionId, event: ChangeEvent) {
        let current = self.connection.lock().expect("Failed to lock connection").lifecycle.current();
        if current != Some(connection) {
            trace!("dropping change from superseded {}: {}", connection, event.summary());
            return;
        }
        self.metrics.lock().expect("Failed to lock metrics").record_event();
        debug!("change {} on {}", event.summary(), connection);
        self.debounce.schedule(event.key());
    }
}

impl RegistryHooks for Inner {
    fn ensure_connected(&self) { self.connect(ConnectReason::Demand); }

    fn release_connection(&self) {
        let handle = {
            let mut connection = self.connection.lock().expect("Failed to lock connection");
            // a registration that raced the grace timer wins
            if !self.registry.is_empty() || connection.lifecycle.state() == ConnectionState::Disconnected {
                return;
            }
            info!("Grace period elapsed with no subscribers");
            self.disconnect_locked(&mut connection)
        };
        if let Some(handle) = handle {
            handle.close();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(connection) = self.connection.get_mut() {
            connection.cancel_retry();
            if let Some(handle) = connection.handle.take() {
                debug!("Realtime manager dropped, closing channel {}", self.channel_name);
                handle.close();
            }
        }
    }
}
