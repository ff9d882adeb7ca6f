use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::state::ConnectionState;

/// Counters accumulated by the manager over its lifetime
#[derive(Debug, Default, Clone)]
pub(crate) struct Metrics {
    total_connections: u64,
    failed_connections: u64,
    latency_total: Duration,
    latency_samples: u32,
    last_event_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Metrics {
    pub fn record_attempt(&mut self) { self.total_connections += 1; }

    pub fn record_connected(&mut self, latency: Duration) {
        self.latency_total += latency;
        self.latency_samples += 1;
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.failed_connections += 1;
        self.last_error = Some(reason.into());
    }

    pub fn record_event(&mut self) { self.last_event_at = Some(Utc::now()); }

    pub fn average_latency_ms(&self) -> f64 {
        if self.latency_samples == 0 {
            return 0.0;
        }
        self.latency_total.as_secs_f64() * 1000.0 / f64::from(self.latency_samples)
    }
}

/// Read-only snapshot of the realtime subsystem, for diagnostics and admin tooling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeStatus {
    pub connection_state: ConnectionState,
    pub subscriber_count: usize,
    pub reconnect_attempt: u32,
    pub retries_exhausted: bool,
    pub pending_invalidation_count: usize,
    pub total_connections: u64,
    pub failed_connections: u64,
    pub average_latency_ms: f64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Live component readings combined with the accumulated counters
pub(crate) struct Readings {
    pub connection_state: ConnectionState,
    pub subscriber_count: usize,
    pub reconnect_attempt: u32,
    pub retries_exhausted: bool,
    pub pending_invalidation_count: usize,
}

impl RealtimeStatus {
    pub(crate) fn project(readings: Readings, metrics: &Metrics) -> Self {
        Self {
            connection_state: readings.connection_state,
            subscriber_count: readings.subscriber_count,
            reconnect_attempt: readings.reconnect_attempt,
            retries_exhausted: readings.retries_exhausted,
            pending_invalidation_count: readings.pending_invalidation_count,
            total_connections: metrics.total_connections,
            failed_connections: metrics.failed_connections,
            average_latency_ms: metrics.average_latency_ms(),
            last_event_at: metrics.last_event_at,
            last_error: metrics.last_error.clone(),
        }
    }

    pub fn is_live(&self) -> bool { self.connection_state == ConnectionState::Connected }
}
