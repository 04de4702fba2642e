//! Logging system configuration and initialization
//!
//! Console and file output are toggled from [`LoggingConfig`]; the effective
//! filter is the configured level plus per-module overrides, with `RUST_LOG`
//! taking precedence over both when set.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use lazy_static::lazy_static;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

pub use crate::infrastructure::config::LoggingConfig;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    let config = LoggingConfig::default();
    init_logging_with_config(&config)
}

/// Initialize the logging system from the app config
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let console_layer = config.console_output.then(|| {
        tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false)
    });

    let file_layer = if config.file_output {
        let appender = rolling::daily(get_log_directory(), "interp-workbench.log");
        let (writer, guard) = non_blocking(appender);
        LOG_GUARDS.lock().expect("log guard lock poisoned").push(guard);

        Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
    } else {
        None
    };

    Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}

/// Builds the env filter: `RUST_LOG` wins, otherwise configured level plus
/// module-specific overrides.
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![config.level.clone()];
    for (module, level) in &config.module_filters {
        directives.push(format!("{module}={level}"));
    }

    let filter = EnvFilter::try_new(directives.join(","))
        .map_err(|e| anyhow::anyhow!("Invalid log filter in configuration: {e}"))?;
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn filter_combines_level_and_module_overrides() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            console_output: true,
            file_output: false,
            module_filters: HashMap::from([("hyper".to_string(), "warn".to_string())]),
        };

        // EnvFilter has no accessors; building without error is the contract.
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn nonsense_level_is_rejected() {
        let config = LoggingConfig {
            level: "not-a-level=with=equals=signs".to_string(),
            console_output: true,
            file_output: false,
            module_filters: HashMap::new(),
        };

        assert!(build_filter(&config).is_err());
    }
}
