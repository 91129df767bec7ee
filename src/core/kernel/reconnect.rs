use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

/// Reconnection timing
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry after a failure or loss
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Retry automatically when the connection fails or drops
    pub enabled: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
            enabled: true,
        }
    }
}

impl ReconnectConfig {
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Capped exponential backoff between connection attempts
///
/// Delays double from `initial_delay` up to `max_delay` and start over after
/// [`reset`](Self::reset), which the monitor calls on every successful connect.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    strategy: ExponentialBackoff,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let strategy = Self::strategy(&config);
        Self {
            config,
            strategy,
            attempts: 0,
        }
    }

    // Yields 2*initial, 4*initial, ...; the first attempt uses initial_delay itself.
    fn strategy(config: &ReconnectConfig) -> ExponentialBackoff {
        let initial_ms = (config.initial_delay.as_millis() as u64).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(initial_ms)
            .max_delay(config.max_delay)
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Number of consecutive failures since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the next attempt; grows with each call.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let delay = if self.attempts == 1 {
            self.config.initial_delay
        } else {
            self.strategy.next().unwrap_or(self.config.max_delay)
        }
        .min(self.config.max_delay);
        debug!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        delay
    }

    pub fn reset(&mut self) {
        if self.attempts > 0 {
            debug!(attempts = self.attempts, "reconnect backoff reset");
        }
        self.attempts = 0;
        self.strategy = Self::strategy(&self.config);
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
