//! Configuration for the spatial index and the request window.
//!
//! Water marks and timing constants are tuning knobs, not invariants; the
//! defaults below are the values the resolver has been running with.
use serde::de::Error;
use std::time::Duration;

/// Highest S2 subdivision level.
pub const MAX_CELL_LEVEL: u64 = 30;

/// Longest geohash the `geohash` crate encodes.
pub const MAX_BUCKET_PRECISION: usize = 12;

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Level of the coarse top cells created on first traffic
    #[serde(default = "Config::default_top_level")]
    pub top_level: u64,

    /// Deepest level a split may produce
    #[serde(default = "Config::default_max_level")]
    pub max_level: u64,

    /// A leaf holding more clients than this is split (high-water mark)
    #[serde(default = "Config::default_split_threshold")]
    pub split_threshold: u64,

    /// Children holding fewer clients than this in total are merged
    /// back into their parent (low-water mark)
    #[serde(default = "Config::default_merge_threshold")]
    pub merge_threshold: u64,

    /// Period of the per-entity merge sweep
    #[serde(default = "Config::default_merge_interval_ms")]
    pub merge_interval_ms: u64,

    /// Length of one window sub-interval
    #[serde(default = "Config::default_rotation_interval_ms")]
    pub rotation_interval_ms: u64,

    /// How long a request counts towards the window
    #[serde(default = "Config::default_retention_ms")]
    pub retention_ms: u64,

    /// Geohash length used as location bucket key
    #[serde(default = "Config::default_bucket_precision")]
    pub bucket_precision: usize,
}

impl Config {
    const fn default_top_level() -> u64 {
        8
    }

    const fn default_max_level() -> u64 {
        16
    }

    const fn default_split_threshold() -> u64 {
        300
    }

    const fn default_merge_threshold() -> u64 {
        200
    }

    const fn default_merge_interval_ms() -> u64 {
        30_000
    }

    const fn default_rotation_interval_ms() -> u64 {
        10_000
    }

    const fn default_retention_ms() -> u64 {
        60_000
    }

    const fn default_bucket_precision() -> usize {
        9
    }

    pub fn with_levels(mut self, top_level: u64, max_level: u64) -> Self {
        self.top_level = top_level;
        self.max_level = max_level;
        self
    }

    pub fn with_thresholds(mut self, split_threshold: u64, merge_threshold: u64) -> Self {
        self.split_threshold = split_threshold;
        self.merge_threshold = merge_threshold;
        self
    }

    pub fn with_merge_interval(mut self, interval: Duration) -> Self {
        self.merge_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_rotation_interval(mut self, interval: Duration) -> Self {
        self.rotation_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_ms = retention.as_millis() as u64;
        self
    }

    pub fn with_bucket_precision(mut self, precision: usize) -> Self {
        self.bucket_precision = precision;
        self
    }

    pub fn merge_interval(&self) -> Duration {
        Duration::from_millis(self.merge_interval_ms)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_millis(self.rotation_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_level > MAX_CELL_LEVEL {
            return Err(format!(
                "max_level must be at most {}, got {}",
                MAX_CELL_LEVEL, self.max_level
            ));
        }

        if self.top_level > self.max_level {
            return Err(format!(
                "top_level ({}) must not exceed max_level ({})",
                self.top_level, self.max_level
            ));
        }

        if self.merge_threshold == 0 {
            return Err("merge_threshold must be greater than zero".to_string());
        }

        if self.merge_threshold >= self.split_threshold {
            return Err(format!(
                "merge_threshold ({}) must be below split_threshold ({})",
                self.merge_threshold, self.split_threshold
            ));
        }

        if self.merge_interval_ms == 0 {
            return Err("merge_interval_ms must be greater than zero".to_string());
        }

        if self.rotation_interval_ms == 0 {
            return Err("rotation_interval_ms must be greater than zero".to_string());
        }

        if self.retention_ms == 0 {
            return Err("retention_ms must be greater than zero".to_string());
        }

        if self.rotation_interval_ms > self.retention_ms {
            return Err(format!(
                "rotation_interval_ms ({}) must not exceed retention_ms ({})",
                self.rotation_interval_ms, self.retention_ms
            ));
        }

        if !(1..=MAX_BUCKET_PRECISION).contains(&self.bucket_precision) {
            return Err(format!(
                "bucket_precision must be within 1..={}, got {}",
                MAX_BUCKET_PRECISION, self.bucket_precision
            ));
        }

        if self.retention_ms / self.rotation_interval_ms > 10_000 {
            log::warn!(
                "Retention of {}ms with rotation every {}ms keeps more than 10000 \
                 buckets in flight per entity",
                self.retention_ms,
                self.rotation_interval_ms
            );
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_level: Self::default_top_level(),
            max_level: Self::default_max_level(),
            split_threshold: Self::default_split_threshold(),
            merge_threshold: Self::default_merge_threshold(),
            merge_interval_ms: Self::default_merge_interval_ms(),
            rotation_interval_ms: Self::default_rotation_interval_ms(),
            retention_ms: Self::default_retention_ms(),
            bucket_precision: Self::default_bucket_precision(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.top_level, 8);
        assert_eq!(config.max_level, 16);
        assert_eq!(config.split_threshold, 300);
        assert_eq!(config.merge_threshold, 200);
        assert_eq!(config.merge_interval(), Duration::from_secs(30));
        assert_eq!(config.rotation_interval(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_thresholds(50, 20)
            .with_retention(Duration::from_secs(120));

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();

        assert_eq!(deserialized, config);
        assert_eq!(deserialized.retention(), Duration::from_secs(120));
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{ "split_threshold": 1000 }"#).unwrap();
        assert_eq!(config.split_threshold, 1000);
        assert_eq!(config.merge_threshold, 200);
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(Config::from_json(r#"{ "splitThreshold": 1000 }"#).is_err());
    }

    #[test]
    fn test_config_validation() {
        let inverted_marks = Config::default().with_thresholds(100, 100);
        assert!(inverted_marks.validate().is_err());

        let inverted_levels = Config::default().with_levels(12, 10);
        assert!(inverted_levels.validate().is_err());

        let too_deep = Config::default().with_levels(8, 31);
        assert!(too_deep.validate().is_err());

        let slow_rotation = Config::default()
            .with_rotation_interval(Duration::from_secs(120))
            .with_retention(Duration::from_secs(60));
        assert!(slow_rotation.validate().is_err());

        let bad_precision = Config::default().with_bucket_precision(13);
        assert!(bad_precision.validate().is_err());

        assert!(Config::from_json(r#"{ "merge_threshold": 500 }"#).is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let config = Config::default().with_levels(6, 14);
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
