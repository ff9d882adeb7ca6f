use serde::Serialize;
use std::time::Duration;
use strum::Display;
use tokio::time::Instant;

use crate::error::TransitionError;
use crate::reconnect::ReconnectState;
use crate::transport::ConnectionId;

/// Connection state for the single change-feed subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Explicit state machine for the connection and its retry bookkeeping.
///
/// Every transition is guarded: callbacks for a superseded attempt and transitions that do not
/// make sense from the current state are rejected instead of being applied.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    reconnect: ReconnectState,
    current: Option<ConnectionId>,
    next_id: u64,
    connecting_since: Option<Instant>,
    exhausted: bool,
}

impl Default for Lifecycle {
    fn default() -> Self { Self::new() }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect: ReconnectState::default(),
            current: None,
            next_id: 0,
            connecting_since: None,
            exhausted: false,
        }
    }

    pub fn state(&self) -> ConnectionState { self.state }
    pub fn attempt(&self) -> u32 { self.reconnect.attempt }
    pub fn current(&self) -> Option<ConnectionId> { self.current }
    pub fn is_exhausted(&self) -> bool { self.exhausted }

    fn next_connection(&mut self, now: Instant) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.current = Some(id);
        self.connecting_since = Some(now);
        self.state = ConnectionState::Connecting;
        id
    }

    /// `disconnected`/`error` → `connecting`. Refused once retries are exhausted.
    pub fn begin_connect(&mut self, now: Instant) -> Result<ConnectionId, TransitionError> {
        match self.state {
            ConnectionState::Error if self.exhausted => Err(TransitionError::Exhausted),
            ConnectionState::Disconnected | ConnectionState::Error => Ok(self.next_connection(now)),
            from => Err(TransitionError::Invalid { from, to: ConnectionState::Connecting }),
        }
    }

    /// Any state → `connecting`, superseding whatever attempt was current. Clears the attempt
    /// counter and the exhausted flag.
    pub fn force_connect(&mut self, now: Instant) -> ConnectionId {
        self.reconnect.reset();
        self.exhausted = false;
        self.next_connection(now)
    }

    fn check_current(&self, id: ConnectionId) -> Result<(), TransitionError> {
        if self.current == Some(id) {
            Ok(())
        } else {
            Err(TransitionError::Stale { stale: id, current: self.current })
        }
    }

    /// `connecting` → `connected`. Resets the attempt counter and returns the connect latency.
    pub fn connected(&mut self, id: ConnectionId, now: Instant) -> Result<Duration, TransitionError> {
        self.check_current(id)?;
        if self.state != ConnectionState::Connecting {
            return Err(TransitionError::Invalid { from: self.state, to: ConnectionState::Connected });
        }
        self.state = ConnectionState::Connected;
        self.reconnect.reset();
        let latency = self.connecting_since.take().map(|since| now.saturating_duration_since(since)).unwrap_or_default();
        Ok(latency)
    }

    /// `connecting`/`connected` → `error`. Returns the incremented attempt counter.
    pub fn failed(&mut self, id: ConnectionId) -> Result<u32, TransitionError> {
        self.check_current(id)?;
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state = ConnectionState::Error;
                self.connecting_since = None;
                Ok(self.reconnect.record_failure())
            }
            from => Err(TransitionError::Invalid { from, to: ConnectionState::Error }),
        }
    }

    /// Stay in `error` and refuse automatic retries until forced
    pub fn mark_exhausted(&mut self) {
        if self.state == ConnectionState::Error {
            self.exhausted = true;
        }
    }

    /// Any state → `disconnected`. Returns the attempt that was current, if any.
    pub fn disconnect(&mut self) -> Option<ConnectionId> {
        self.state = ConnectionState::Disconnected;
        self.reconnect.reset();
        self.exhausted = false;
        self.connecting_since = None;
        self.current.take()
    }
}
