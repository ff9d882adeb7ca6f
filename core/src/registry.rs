use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use ulid::Ulid;

use crate::cache::{same_cache, CacheHandle};

pub(crate) const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Opaque subscriber token. Generated when the consumer does not supply one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new() -> Self { Self(format!("S-{}", Ulid::new())) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl Default for SubscriberId {
    fn default() -> Self { Self::new() }
}

impl From<&str> for SubscriberId {
    fn from(val: &str) -> Self { SubscriberId(val.to_string()) }
}

impl From<String> for SubscriberId {
    fn from(val: String) -> Self { SubscriberId(val) }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

struct Subscriber {
    cache: CacheHandle,
    /// Which registration currently owns this entry; only that registration's guard removes it
    registration: u64,
    registered_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

/// Diagnostic view of one registered subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub registered_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// What the registry asks of the connection owner. Never called with a registry lock held.
pub(crate) trait RegistryHooks: Send + Sync {
    /// A subscriber registered; connect if nothing is connected yet. Must be idempotent.
    fn ensure_connected(&self);
    /// The grace period elapsed with no subscribers. Implementations re-check emptiness.
    fn release_connection(&self);
}

/// Tracks interested consumers and gates the connection on their presence.
///
/// Removing the last subscriber does not disconnect right away; teardown is scheduled after a
/// grace period so a consumer that unmounts and immediately remounts does not churn the
/// connection. Any registration in the meantime cancels the scheduled teardown.
pub struct SubscriberRegistry(Arc<Inner>);

struct Inner {
    subscribers: Mutex<BTreeMap<SubscriberId, Subscriber>>,
    grace_period: Duration,
    grace_timer: Mutex<Option<JoinHandle<()>>>,
    grace_generation: AtomicU64,
    next_registration: AtomicU64,
    hooks: Weak<dyn RegistryHooks>,
}

impl SubscriberRegistry {
    pub(crate) fn new(grace_period: Duration, hooks: Weak<dyn RegistryHooks>) -> Self {
        Self(Arc::new(Inner {
            subscribers: Mutex::new(BTreeMap::new()),
            grace_period,
            grace_timer: Mutex::new(None),
            grace_generation: AtomicU64::new(0),
            next_registration: AtomicU64::new(0),
            hooks,
        }))
    }

    /// Add a subscriber, or hand an existing id a new cache handle. Must be called within a
    /// tokio runtime.
    ///
    /// Re-registering an id transfers the entry to the new guard; guards from earlier
    /// registrations of that id no longer remove it.
    pub fn register(&self, cache: CacheHandle, id: Option<SubscriberId>) -> SubscriptionGuard {
        let id = id.unwrap_or_default();
        let now = Utc::now();
        let registration = self.0.next_registration.fetch_add(1, Ordering::Relaxed) + 1;
        let count = {
            let mut subscribers = self.0.subscribers.lock().expect("Failed to lock subscribers");
            match subscribers.entry(id.clone()) {
                Entry::Occupied(mut existing) => {
                    debug!("subscriber {} re-registered, replacing its cache handle", id);
                    let existing = existing.get_mut();
                    existing.cache = cache;
                    existing.registration = registration;
                    existing.last_activity_at = now;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Subscriber { cache, registration, registered_at: now, last_activity_at: now });
                }
            }
            subscribers.len()
        };
        debug!("registered subscriber {} ({} active)", id, count);

        self.0.cancel_grace();
        if let Some(hooks) = self.0.hooks.upgrade() {
            hooks.ensure_connected();
        }

        SubscriptionGuard { id, registration, registry: Arc::downgrade(&self.0), disposed: AtomicBool::new(false) }
    }

    /// Remove a subscriber. Unknown ids are a no-op and return false.
    pub fn unregister(&self, id: &SubscriberId) -> bool { self.0.unregister(id, None) }

    pub fn len(&self) -> usize { self.0.subscribers.lock().expect("Failed to lock subscribers").len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn is_grace_pending(&self) -> bool { self.0.grace_timer.lock().expect("Failed to lock grace timer").is_some() }

    /// Drop every subscriber and any scheduled teardown. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.0.cancel_grace();
        let removed = std::mem::take(&mut *self.0.subscribers.lock().expect("Failed to lock subscribers"));
        removed.len()
    }

    /// Stamp every subscriber as active and return the distinct caches they hold
    pub fn touch_all(&self) -> Vec<CacheHandle> {
        let now = Utc::now();
        let mut subscribers = self.0.subscribers.lock().expect("Failed to lock subscribers");
        let mut caches: Vec<CacheHandle> = Vec::new();
        for subscriber in subscribers.values_mut() {
            subscriber.last_activity_at = now;
            if !caches.iter().any(|cache| same_cache(cache, &subscriber.cache)) {
                caches.push(subscriber.cache.clone());
            }
        }
        caches
    }

    pub fn snapshot(&self) -> Vec<SubscriberInfo> {
        let subscribers = self.0.subscribers.lock().expect("Failed to lock subscribers");
        subscribers
            .iter()
            .map(|(id, s)| SubscriberInfo { id: id.clone(), registered_at: s.registered_at, last_activity_at: s.last_activity_at })
            .collect()
    }
}

impl Inner {
    /// With `registration` set, only removes the entry if that registration still owns it
    fn unregister(self: &Arc<Self>, id: &SubscriberId, registration: Option<u64>) -> bool {
        let now_empty = {
            let mut subscribers = self.subscribers.lock().expect("Failed to lock subscribers");
            match (subscribers.get(id), registration) {
                (None, _) => return false,
                (Some(existing), Some(registration)) if existing.registration != registration => {
                    debug!("subscriber {} was re-registered, keeping the newer registration", id);
                    return false;
                }
                _ => {}
            }
            subscribers.remove(id);
            subscribers.is_empty()
        };
        debug!("unregistered subscriber {}", id);

        if now_empty {
            self.schedule_grace();
        }
        true
    }

    fn schedule_grace(self: &Arc<Self>) {
        // generation and slot only change together, under the slot lock
        let mut slot = self.grace_timer.lock().expect("Failed to lock grace timer");
        let generation = self.grace_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);
        let grace_period = self.grace_period;
        info!("last subscriber gone, releasing connection in {:?}", grace_period);

        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            let Some(inner) = weak.upgrade() else { return };
            {
                let mut timer = inner.grace_timer.lock().expect("Failed to lock grace timer");
                // a registration or a newer schedule bumped the generation after we slept
                if inner.grace_generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                timer.take();
            }
            let empty = inner.subscribers.lock().expect("Failed to lock subscribers").is_empty();
            if empty {
                if let Some(hooks) = inner.hooks.upgrade() {
                    hooks.release_connection();
                }
            }
        });

        if let Some(previous) = slot.replace(timer) {
            previous.abort();
        }
    }

    fn cancel_grace(&self) {
        let mut slot = self.grace_timer.lock().expect("Failed to lock grace timer");
        self.grace_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = slot.take() {
            timer.abort();
            debug!("scheduled teardown cancelled");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut timer) = self.grace_timer.lock() {
            if let Some(timer) = timer.take() {
                timer.abort();
            }
        }
    }
}

/// Disposer returned by [`SubscriberRegistry::register`].
///
/// Unregisters on [`dispose`](Self::dispose) or when dropped, whichever comes first. Disposing
/// more than once is a no-op.
pub struct SubscriptionGuard {
    id: SubscriberId,
    registration: u64,
    registry: Weak<Inner>,
    disposed: AtomicBool,
}

impl SubscriptionGuard {
    pub fn id(&self) -> &SubscriberId { &self.id }

    pub fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.id, Some(self.registration));
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) { self.dispose(); }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard").field("id", &self.id).field("disposed", &self.is_disposed()).finish()
    }
}
