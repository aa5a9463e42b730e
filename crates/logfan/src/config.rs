//! Host configuration.

use std::time::Duration;

/// Configuration for the log plugin host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Queue depth beyond which a monitor sample counts as overflow
    pub short_circuit_threshold: usize,
    /// How often the pressure monitor samples queue depths
    pub monitor_frequency: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            short_circuit_threshold: 1000,
            monitor_frequency: Duration::from_millis(10_000),
        }
    }
}

impl HostConfig {
    /// Create a new builder
    pub fn builder() -> HostConfigBuilder {
        HostConfigBuilder::default()
    }
}

/// Builder for HostConfig
#[derive(Default)]
pub struct HostConfigBuilder {
    config: HostConfig,
}

impl HostConfigBuilder {
    /// Set the short-circuit queue depth threshold
    pub fn short_circuit_threshold(mut self, lines: usize) -> Self {
        self.config.short_circuit_threshold = lines;
        self
    }

    /// Set the pressure monitor sampling frequency
    pub fn monitor_frequency(mut self, frequency: Duration) -> Self {
        self.config.monitor_frequency = frequency;
        self
    }

    /// Build the configuration
    pub fn build(self) -> HostConfig {
        self.config
    }
}
