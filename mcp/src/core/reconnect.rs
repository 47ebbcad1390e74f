//! Reconnection policy for pooled MCP connections.

use std::time::Duration;

use super::config::McpPoolConfig;

/// Bounds and backoff for explicit reconnects.
///
/// The pool counts attempts per connection since it was last connected; this type
/// only answers "how long to wait before attempt N" and "is N allowed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &McpPoolConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            multiplier: config.reconnect_backoff_multiplier.max(1),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
        }
    }

    /// delay = min(base_delay * multiplier^(attempt-1), max_delay)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = u64::from(self.multiplier).saturating_pow(exponent);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    /// True once `attempts` reconnects have used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
