//! # Application Configuration
//!
//! Layered configuration:
//! 1. compiled defaults (`turntable_core::primitives`)
//! 2. optional TOML file (`--config turntable.toml`)
//! 3. CLI flag overrides (applied by `cli`)
//!
//! Security knobs (CORS, rate limit, API key) and the log format stay in
//! environment variables, read where they are used.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! blocking_init = false
//!
//! [stage]
//! transport = "motion-controller"
//! device_path = "/dev/ttyACM0"
//! homing_tolerance = 10
//! homing_timeout_ms = 60000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use turntable_core::{StageConfig, StageError};

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Run the initialization sequence before accepting requests.
    pub blocking_init: bool,
    /// Directory served under `/static`.
    pub static_dir: Option<PathBuf>,
    /// Heading of the control panel.
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            blocking_init: false,
            static_dir: None,
            title: "Turntable 360".to_string(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub stage: StageConfig,
}

impl AppConfig {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, StageError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            StageError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(StageError::Config(format!(
                "Config file size {} bytes exceeds maximum {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            StageError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self, StageError> {
        let config: Self =
            toml::from_str(text).map_err(|e| StageError::Config(format!("Invalid TOML: {}", e)))?;
        config.stage.validate()?;
        Ok(config)
    }

    /// Render the resolved configuration as TOML.
    pub fn to_toml(&self) -> Result<String, StageError> {
        toml::to_string_pretty(self).map_err(|e| StageError::Config(e.to_string()))
    }
}
