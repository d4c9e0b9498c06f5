//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::Configuration;

/// Builder for creating test configurations.
///
/// Starts from the defaults with a short request timeout and lets tests
/// override the few knobs they care about.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .with_human_readable_numbers()
///     .with_tenant_rate("acme", 1.0)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Defaults with a 5 second request timeout and a loopback bind address.
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.reader.bind = "127.0.0.1:0".to_string();
        config.reader.request_timeout = Duration::from_secs(5);
        config.stats.enabled = false;
        Self { config }
    }

    pub fn with_request_timeout_ms(mut self, millis: u64) -> Self {
        self.config.reader.request_timeout = Duration::from_millis(millis);
        self
    }

    pub fn with_human_readable_numbers(mut self) -> Self {
        self.config.reader.human_readable_numbers = true;
        self
    }

    pub fn with_max_concurrent_evaluations(mut self, size: usize) -> Self {
        self.config.reader.max_concurrent_evaluations = size;
        self
    }

    pub fn with_max_data_points(mut self, points: usize) -> Self {
        self.config.reader.max_data_points = points;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.config.search.limit = limit;
        self
    }

    pub fn with_native_step_secs(mut self, secs: u64) -> Self {
        self.config.storage.native_step = Duration::from_secs(secs);
        self
    }

    /// Enables throttling and gives `tenant` an explicit rate.
    pub fn with_tenant_rate(mut self, tenant: &str, rate: f64) -> Self {
        self.config.throttling.enabled = true;
        self.config
            .throttling
            .tenants
            .insert(tenant.to_string(), rate);
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = TestConfigBuilder::new()
            .with_request_timeout_ms(250)
            .with_human_readable_numbers()
            .with_search_limit(3)
            .with_tenant_rate("acme", 2.0)
            .build();

        assert_eq!(config.reader.request_timeout, Duration::from_millis(250));
        assert!(config.reader.human_readable_numbers);
        assert_eq!(config.search.limit, 3);
        assert_eq!(config.throttling.rate_for("acme"), Some(2.0));
    }
}
