use std::time::Duration;

use crate::{debounce::DEFAULT_DEBOUNCE, reconnect::ReconnectPolicy, registry::DEFAULT_GRACE_PERIOD, router::RoutingTable};

pub const DEFAULT_CHANNEL_NAME: &str = "wms-changes";

/// Settings for a [`RealtimeManager`](crate::RealtimeManager).
///
/// The defaults are the reference values: 500ms debounce, 30s grace period, and reconnects
/// backing off from 1s to 30s over at most 5 attempts.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Name of the single change-feed channel all topics are multiplexed over
    pub channel_name: String,
    pub debounce: Duration,
    pub grace_period: Duration,
    pub reconnect: ReconnectPolicy,
    pub routing: RoutingTable,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            grace_period: DEFAULT_GRACE_PERIOD,
            reconnect: ReconnectPolicy::default(),
            routing: RoutingTable::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn with_channel_name(mut self, channel_name: impl Into<String>) -> Self {
        self.channel_name = channel_name.into();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }
}
