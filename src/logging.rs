use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "PORTAL_CACHE_LOG";

/// Install the global tracing subscriber.
///
/// Logs go to a daily rolling file when a directory is configured, stderr
/// otherwise. Keep the returned guard alive until exit so buffered file
/// output is flushed.
pub fn init(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(&logging.filter))
    .map_err(|e| eyre!("Invalid log filter {:?}: {}", logging.filter, e))?;

  match &logging.directory {
    Some(directory) => {
      std::fs::create_dir_all(directory)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;
      let appender = tracing_appender::rolling::daily(directory, "portal-cache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;
      Ok(None)
    }
  }
}
