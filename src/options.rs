//! Configuration options for the provider engine.

use std::time::Duration;

use crate::executor::ExecutorConfig;

/// Provider configuration.
///
/// Defaults match the reference deployment; hosts normally only override
/// the timeouts in tests.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Maximum time a get-batch caller waits for another thread's in-flight
    /// first-page load before failing safe with an empty result.
    pub enumeration_wait_timeout: Duration,
    /// Bounded wait for the delegated async listing fetch to populate the
    /// cache during first-page enumeration loading.
    pub listing_fetch_timeout: Duration,
    /// Interval between write-intent queue drains.
    pub write_drain_interval: Duration,
    /// Hard cap on get-batch callbacks per enumeration session.
    pub max_calls_per_enumeration: u32,
    /// Async executor configuration.
    pub executor: ExecutorConfig,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            enumeration_wait_timeout: Duration::from_millis(5000),
            listing_fetch_timeout: Duration::from_millis(100),
            write_drain_interval: Duration::from_millis(100),
            max_calls_per_enumeration: 100,
            executor: ExecutorConfig::default(),
        }
    }
}

impl ProviderOptions {
    /// Set the bounded wait for concurrent first-page loads.
    ///
    /// # Arguments
    /// * `timeout` - Maximum wait before failing safe
    pub fn with_enumeration_wait_timeout(mut self, timeout: Duration) -> Self {
        self.enumeration_wait_timeout = timeout;
        self
    }

    /// Set the bounded wait for delegated listing fetches.
    pub fn with_listing_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.listing_fetch_timeout = timeout;
        self
    }

    /// Set the write-intent drain interval.
    pub fn with_write_drain_interval(mut self, interval: Duration) -> Self {
        self.write_drain_interval = interval;
        self
    }

    /// Set the per-session get-batch call cap.
    pub fn with_max_calls_per_enumeration(mut self, cap: u32) -> Self {
        self.max_calls_per_enumeration = cap;
        self
    }

    /// Set the executor configuration.
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }
}
