use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use wms_realtime_proto::TopicKey;

pub(crate) const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

type FlushFn = Arc<dyn Fn(TopicKey) + Send + Sync>;

struct PendingInvalidation {
    scheduled_at: DateTime<Utc>,
    generation: u64,
    timer: JoinHandle<()>,
}

/// Sliding debounce keyed by [`TopicKey`].
///
/// A new event for a key that already has a pending timer restarts that timer rather than
/// queueing a second flush, so a burst produces exactly one flush once the key goes quiet for
/// `delay`. Different keys never affect each other's timers.
pub struct DebounceScheduler {
    delay: Duration,
    pending: Arc<DashMap<TopicKey, PendingInvalidation>>,
    generation: AtomicU64,
    flush: FlushFn,
}

impl DebounceScheduler {
    pub fn new<F>(delay: Duration, flush: F) -> Self
    where F: Fn(TopicKey) + Send + Sync + 'static {
        Self { delay, pending: Arc::new(DashMap::new()), generation: AtomicU64::new(0), flush: Arc::new(flush) }
    }

    pub fn delay(&self) -> Duration { self.delay }

    /// Start or restart the timer for `key`. Must be called within a tokio runtime.
    pub fn schedule(&self, key: TopicKey) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        // The shard lock is held across the spawn so the timer can never look for its entry
        // before it has been inserted.
        match self.pending.entry(key) {
            Entry::Occupied(mut occupied) => {
                let timer = self.spawn_timer(key, generation);
                let previous = occupied.insert(PendingInvalidation { scheduled_at: Utc::now(), generation, timer });
                previous.timer.abort();
                trace!("debounce restarted for {}", key);
            }
            Entry::Vacant(vacant) => {
                let timer = self.spawn_timer(key, generation);
                vacant.insert(PendingInvalidation { scheduled_at: Utc::now(), generation, timer });
                debug!("debounce scheduled for {} in {:?}", key, self.delay);
            }
        }
    }

    fn spawn_timer(&self, key: TopicKey, generation: u64) -> JoinHandle<()> {
        let pending = self.pending.clone();
        let flush = self.flush.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // only the newest timer for a key may flush it
            if pending.remove_if(&key, |_, entry| entry.generation == generation).is_some() {
                debug!("debounce flushing {}", key);
                flush(key);
            }
        })
    }

    /// Drop a pending flush without running it
    pub fn cancel(&self, key: &TopicKey) -> bool {
        match self.pending.remove(key) {
            Some((_, entry)) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Drop every pending flush. Returns how many were discarded.
    pub fn cancel_all(&self) -> usize {
        let keys: Vec<TopicKey> = self.pending.iter().map(|entry| *entry.key()).collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    pub fn pending_count(&self) -> usize { self.pending.len() }

    /// Pending keys with the time their current timer was (re)started
    pub fn pending(&self) -> Vec<(TopicKey, DateTime<Utc>)> {
        let mut pending: Vec<_> = self.pending.iter().map(|entry| (*entry.key(), entry.scheduled_at)).collect();
        pending.sort_by_key(|(key, _)| *key);
        pending
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        let discarded = self.cancel_all();
        if discarded > 0 {
            debug!("debounce scheduler dropped with {} pending flushes", discarded);
        }
    }
}
