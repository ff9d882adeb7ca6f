use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff for automatic reconnection.
///
/// `delay(attempt) = min(base_delay * 2^(attempt - 1), max_delay)` where `attempt` is 1 for the
/// first retry. Past `max_attempts` the policy reports [`Backoff::Exhausted`] and the manager
/// stops retrying until a forced reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Retry(Duration),
    Exhausted,
}

impl Default for ReconnectPolicy {
    fn default() -> Self { Self { base_delay: DEFAULT_BASE_DELAY, max_delay: DEFAULT_MAX_DELAY, max_attempts: DEFAULT_MAX_ATTEMPTS } }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self { Self { base_delay, max_delay, max_attempts } }

    pub fn delay(&self, attempt: u32) -> Backoff {
        if attempt > self.max_attempts {
            return Backoff::Exhausted;
        }
        if attempt == 0 {
            return Backoff::Retry(Duration::ZERO);
        }

        let multiplier = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let delay = self.base_delay.checked_mul(multiplier).unwrap_or(self.max_delay);
        Backoff::Retry(delay.min(self.max_delay))
    }
}

/// Attempt counter read by [`ReconnectPolicy`]. Reset on every successful connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempt: u32,
}

impl ReconnectState {
    pub fn record_failure(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    pub fn reset(&mut self) { self.attempt = 0; }
}
