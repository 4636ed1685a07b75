//! Configuration for the managers.

use std::time::Duration;

use vellum_core::ValidationLimits;

/// Configuration shared by the document, sharing and branch managers.
#[derive(Debug, Clone)]
pub struct VellumConfig {
    /// How long a read keeps polling an empty path before concluding it is
    /// absent.
    pub settle_window: Duration,
    /// Pause between polls inside the settle window.
    pub settle_poll_interval: Duration,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Maximum title length, in characters.
    pub max_title_len: usize,
    /// Maximum number of tags per document.
    pub max_tags: usize,
}

impl Default for VellumConfig {
    fn default() -> Self {
        let limits = ValidationLimits::default();
        Self {
            settle_window: Duration::from_millis(800),
            settle_poll_interval: Duration::from_millis(50),
            store_timeout: Duration::from_secs(10),
            max_title_len: limits.max_title_len,
            max_tags: limits.max_tags,
        }
    }
}

impl VellumConfig {
    /// Set the settle window.
    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    /// Set the poll interval used inside the settle window.
    pub fn with_settle_poll_interval(mut self, interval: Duration) -> Self {
        self.settle_poll_interval = interval;
        self
    }

    /// Set the per-call store timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the maximum title length.
    pub fn with_max_title_len(mut self, len: usize) -> Self {
        self.max_title_len = len;
        self
    }

    /// Set the maximum tag count.
    pub fn with_max_tags(mut self, max: usize) -> Self {
        self.max_tags = max;
        self
    }

    /// Validation limits derived from this configuration.
    pub fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_title_len: self.max_title_len,
            max_tags: self.max_tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = VellumConfig::default()
            .with_settle_window(Duration::from_millis(20))
            .with_max_tags(3);
        assert_eq!(config.settle_window, Duration::from_millis(20));
        assert_eq!(config.limits().max_tags, 3);
        assert_eq!(config.store_timeout, Duration::from_secs(10));
    }
}
