//! Configuration
//!
//! JSON file with `capture`, `webrtc` and `session` sections. Every field
//! has a default, so an empty object (or no file) is a valid configuration.

mod schema;

pub use schema::{AppConfig, SessionConfig};

use std::path::Path;
use tracing::info;

use crate::error::{AppError, Result};

impl AppConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }
}
