//! Store configuration
//!
//! Settings that select the store engine and tune loading and cursor paging.
//! Values come from the caller (or from CLI flags); reading configuration
//! files is left to the host application.
//!
//! # Examples
//!
//! ```rust
//! use joinbase_core::StoreConfig;
//!
//! let config = StoreConfig::from_json_str(r#"{"store_name": "zendesk", "batch_size": 250}"#)?;
//! assert_eq!(config.engine, "memory");
//! assert_eq!(config.batch_size, 250);
//! # Ok::<(), joinbase_core::JoinBaseError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{JoinBaseError, Result};
use crate::logging::{LogLevel, Logger};

/// Records per bulk insert
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Documents fetched per cursor page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Name of the built-in embedded in-memory engine
pub const MEMORY_ENGINE: &str = "memory";

pub const DEFAULT_STORE_NAME: &str = "joinbase";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Store engine name; only `"memory"` is built in
    pub engine: String,
    /// Name passed to `start`
    pub store_name: String,
    pub batch_size: usize,
    pub page_size: usize,
    /// One of error, warn, info, debug, trace
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            engine: MEMORY_ENGINE.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            log_level: LogLevel::Warn.as_str().to_lowercase(),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a configuration held in a JSON string.
    /// Missing keys fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(json)
            .map_err(|e| JoinBaseError::ConfigurationError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine != MEMORY_ENGINE {
            return Err(JoinBaseError::ConfigurationError(format!(
                "Unknown store engine in configuration: {}",
                self.engine
            )));
        }
        if self.store_name.trim().is_empty() {
            return Err(JoinBaseError::ConfigurationError(
                "Store name cannot be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(JoinBaseError::ConfigurationError(
                "Batch size must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(JoinBaseError::ConfigurationError(
                "Page size must be at least 1".to_string(),
            ));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<LogLevel> {
        self.log_level.parse()
    }

    /// Stderr logger at the configured level
    pub fn logger(&self) -> Result<Logger> {
        Ok(Logger::stderr(self.log_level()?))
    }
}
