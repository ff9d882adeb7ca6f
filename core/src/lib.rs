//! # Warehouse realtime core
//!
//! Keeps client-side query caches fresh by listening to the hosted change feed over a single
//! shared subscription.
//!
//! ```text
//! change feed ─▶ RealtimeManager ─▶ DebounceScheduler ─(quiet period)─▶ InvalidationRouter ─▶ QueryCache::invalidate
//!      ▲                │
//!      └── reconnect ◀──┴── ReconnectPolicy (on channel error / timeout / close)
//! ```
//!
//! Consumers only ever hold a [`SubscriptionGuard`]; the transport and the cache are supplied by
//! the integration layer through the [`ChangeTransport`] and [`QueryCache`] traits.

pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod reconnect;
pub mod registry;
pub mod router;
pub mod state;
pub mod transport;

pub use cache::{CacheHandle, InvalidationPredicate, QueryCache};
pub use config::RealtimeConfig;
pub use error::{TransitionError, TransportError};
pub use manager::{ExternalTrigger, RealtimeManager};
pub use metrics::RealtimeStatus;
pub use reconnect::{Backoff, ReconnectPolicy, ReconnectState};
pub use registry::{SubscriberId, SubscriberInfo, SubscriptionGuard};
pub use router::{InvalidationRouter, RoutingTable};
pub use state::ConnectionState;
pub use transport::{ChangeTransport, ChannelHandle, ConnectionId, TransportSignal, TransportSink};

pub use wms_realtime_proto as proto;
