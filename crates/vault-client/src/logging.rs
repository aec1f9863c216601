use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialise the global tracing subscriber: JSON lines to a daily-rolled
/// file under `log_dir`, compact lines to stderr.
///
/// `RUST_LOG` takes precedence over the configured level. Returns a
/// [`WorkerGuard`] that **must** be held for the lifetime of the process.
/// Dropping it flushes and closes the log file writer.
pub fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    // Create log directory if it doesn't exist.
    std::fs::create_dir_all(&logging.log_dir)
        .with_context(|| format!("failed to create log directory {}", logging.log_dir))?;

    let file_appender = tracing_appender::rolling::daily(&logging.log_dir, &logging.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(logging)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .json(),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(guard)
}

/// Configured level for `vault_client`, `warn` for everything else.
fn default_filter(logging: &LoggingConfig) -> String {
    format!("vault_client={},warn", logging.level.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_level_to_crate() {
        let logging = LoggingConfig {
            level: "DEBUG".into(),
            ..LoggingConfig::default()
        };
        assert_eq!(default_filter(&logging), "vault_client=debug,warn");
        assert_eq!(default_filter(&LoggingConfig::default()), "vault_client=info,warn");
    }

    #[test]
    fn test_init_creates_nested_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");
        let logging = LoggingConfig {
            log_dir: log_dir.to_string_lossy().into_owned(),
            ..LoggingConfig::default()
        };

        let guard = init_tracing(&logging).unwrap();
        assert!(log_dir.is_dir());
        drop(guard);

        // A second install fails instead of panicking.
        assert!(init_tracing(&logging).is_err());
    }
}
