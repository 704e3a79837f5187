//! Reconnect policy for the push channel.
//!
//! Implements exponential backoff with configurable parameters. There is no retry
//! limit: the connection manager keeps retrying until it is told to disconnect.

use std::time::Duration;

use crate::config::ReconnectSettings;

/// Reconnect policy implementing capped exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum delay (cap for exponential growth), in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl ReconnectPolicy {
    pub fn new(settings: &ReconnectSettings) -> Self {
        Self {
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Backoff in milliseconds for the given attempt exponent.
    ///
    /// `initial_backoff * multiplier^attempt`, capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_ms as f64) as u64
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(&ReconnectSettings::default())
    }
}
