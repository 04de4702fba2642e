//! Configuration infrastructure
//!
//! Configuration is a single JSON file in the user's config directory,
//! created with defaults on first run. Every value can be overridden from
//! the environment with the `INTERP_WORKBENCH` prefix, e.g.
//! `INTERP_WORKBENCH_BACKEND__BASE_URL`.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Built-in defaults, the values the first-run config file is written with
pub mod defaults {
    pub const BASE_URL: &str = "http://localhost:9999/api/application";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const USER_AGENT: &str = "interp-workbench/0.2";
    pub const ACTOR_EMAIL: &str = "local-user@workbench";
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the translation backend lives
    pub backend: BackendConfig,

    /// Who is operating the workbench
    pub actor: ActorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Connection settings for the translation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend API, e.g. `http://localhost:9999/api/application`
    pub base_url: String,

    /// Timeout for plain REST requests in seconds (streams are exempt)
    pub request_timeout_seconds: u64,

    /// User agent string
    pub user_agent: String,
}

/// Identity used in derived result file names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    pub email: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            actor: ActorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self { email: defaults::ACTOR_EMAIL.to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "warn".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "backend.base_url must not be empty".to_string(),
            });
        }

        if self.backend.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                message: "backend.request_timeout_seconds must be greater than 0".to_string(),
            });
        }

        if self.actor.email.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "actor.email must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("interp-workbench");

        Ok(config_dir)
    }

    /// Create a new configuration manager with the default config location
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        let config_path = config_dir.join("interp_workbench_config.json");

        Ok(Self { config_path })
    }

    /// Create a manager bound to an explicit config file
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Initialize configuration system on first run
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        let config_dir = self.config_path.parent().context("Failed to get config directory")?;

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).await.context("Failed to create config directory")?;
            info!("✅ Created configuration directory: {:?}", config_dir);
        }

        if self.config_path.exists() {
            self.load_config().await
        } else {
            info!("🎉 First run detected - initializing default configuration");
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            Ok(default_config)
        }
    }

    /// Load the configuration, applying environment overrides
    pub async fn load_config(&self) -> Result<AppConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(self.config_path.clone()))
            .add_source(config::Environment::with_prefix("INTERP_WORKBENCH").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {:?}", self.config_path))?;

        let app_config: AppConfig =
            settings.try_deserialize().context("Configuration file is malformed")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Save the configuration as pretty-printed JSON
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        let json =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, json)
            .await
            .with_context(|| format!("Failed to write config to {:?}", self.config_path))?;

        info!("💾 Saved configuration to {:?}", self.config_path);
        Ok(())
    }
}
