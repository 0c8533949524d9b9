//! Log output setup

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "POLICY_HUB_LOG";

/// Build the filter from `POLICY_HUB_LOG`, falling back to the configured level
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber writing to `log_file`.
///
/// Keep the returned guard alive for the lifetime of the process, buffered
/// lines are flushed when it is dropped.
pub fn init(config: &LogConfig, log_file: &Path) -> anyhow::Result<WorkerGuard> {
    let dir = log_file.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = log_file
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", log_file.display()))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let registry = tracing_subscriber::registry().with(env_filter(config));
    if config.json {
        registry
            .with(fmt::layer().json().with_writer(writer).with_ansi(false))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init()?;
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_falls_back_to_info_for_invalid_level() {
        let config = LogConfig {
            level: "policy_hub=verbose".to_string(),
            json: false,
        };

        // POLICY_HUB_LOG is not set in the test environment
        if std::env::var(LOG_ENV).is_err() {
            assert_eq!(env_filter(&config).to_string(), "info");
        }
    }

    #[test]
    fn env_filter_uses_configured_level() {
        let config = LogConfig {
            level: "policy_hub=debug".to_string(),
            json: true,
        };

        if std::env::var(LOG_ENV).is_err() {
            assert_eq!(env_filter(&config).to_string(), "policy_hub=debug");
        }
    }
}
