//! Engine builder for flexible configuration
//!
//! Collects configuration through shorthand setters and validates it once,
//! when the engine is built.

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use std::time::Duration;

/// Builder for an [`Engine`] with custom water marks, levels and timing.
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: Config,
}

impl EngineBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Level of the coarse cells created on first traffic and the deepest
    /// level splits may reach.
    pub fn levels(mut self, top_level: u64, max_level: u64) -> Self {
        self.config = self.config.with_levels(top_level, max_level);
        self
    }

    pub fn split_threshold(mut self, threshold: u64) -> Self {
        self.config.split_threshold = threshold;
        self
    }

    pub fn merge_threshold(mut self, threshold: u64) -> Self {
        self.config.merge_threshold = threshold;
        self
    }

    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_merge_interval(interval);
        self
    }

    pub fn rotation_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_rotation_interval(interval);
        self
    }

    /// How long a request keeps counting towards load and centroids.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.config = self.config.with_retention(retention);
        self
    }

    pub fn bucket_precision(mut self, precision: usize) -> Self {
        self.config = self.config.with_bucket_precision(precision);
        self
    }

    /// Validate the configuration and start the engine.
    pub fn build(self) -> Result<Engine> {
        Engine::with_config(self.config)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
