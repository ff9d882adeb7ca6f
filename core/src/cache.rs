use serde::Serialize;
use std::sync::Arc;

use wms_realtime_proto::CacheDomain;

/// Matches every cache entry whose key starts with `domain`.
///
/// The predicate is deliberately abstract: an integration layer translates it into whatever
/// invalidation call its query-cache library exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InvalidationPredicate {
    pub domain: CacheDomain,
}

impl InvalidationPredicate {
    pub fn domain(domain: CacheDomain) -> Self { Self { domain } }

    /// True if a cache key of the form `[domain, ...params]` falls under this predicate
    pub fn matches<S: AsRef<str>>(&self, key: &[S]) -> bool { key.first().is_some_and(|head| head.as_ref() == self.domain.as_str()) }
}

impl std::fmt::Display for InvalidationPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "[{}, ..]", self.domain) }
}

/// The structured query cache a UI consumer reads from.
///
/// Implementations must tolerate concurrent `invalidate` calls; the realtime manager never locks
/// the cache, it only calls into it.
pub trait QueryCache: Send + Sync {
    fn invalidate(&self, predicate: &InvalidationPredicate);
}

/// Shared handle to a consumer's cache
pub type CacheHandle = Arc<dyn QueryCache>;

impl<F> QueryCache for F
where F: Fn(&InvalidationPredicate) + Send + Sync
{
    fn invalidate(&self, predicate: &InvalidationPredicate) { self(predicate) }
}

/// Same cache instance, regardless of how many subscribers hold it
pub(crate) fn same_cache(a: &CacheHandle, b: &CacheHandle) -> bool { std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)) }
