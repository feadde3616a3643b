use crate::core::{RegistryError, Result};
use serde::Deserialize;
use std::path::Path;

/// Registry configuration
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound on retained rows; the oldest row is evicted first.
    /// `None` keeps every record.
    pub max_records: Option<usize>,

    /// Buffered events per async feed receiver before it starts lagging
    pub feed_capacity: usize,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self {
            max_records: None,
            feed_capacity: 1024,
        }
    }

    /// Bound the number of retained rows
    pub fn max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    /// Set the async feed buffer size
    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }

    /// Parse from a JSON document
    ///
    /// # Examples
    ///
    /// ```
    /// use pipetable::RegistryConfig;
    ///
    /// let config = RegistryConfig::from_json(r#"{ "max_records": 500 }"#).unwrap();
    /// assert_eq!(config.max_records, Some(500));
    /// assert_eq!(config.feed_capacity, 1024);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.feed_capacity == 0 {
            return Err(RegistryError::Config("feed_capacity must be > 0".to_string()));
        }

        if self.max_records == Some(0) {
            return Err(RegistryError::Config("max_records must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}
