//! Tracing subscriber setup for embedding applications.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `dashkeep=debug`.
pub const LOG_ENV: &str = "DASHKEEP_LOG";

const LOG_FILE_PREFIX: &str = "dashkeep.log";

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// With `log_dir` logs go to a daily rolling file in that directory and the
/// returned guard must be kept alive until exit so buffered lines are flushed.
/// Without it logs go to stderr.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let registry = tracing_subscriber::registry().with(env_filter());

  match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create log directory: {}", e))?;

      let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      registry
        .with(
          tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false),
        )
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(Some(guard))
    }
    None => {
      registry
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(None)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_file_logging_then_second_init_fails() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    let guard = init_logging(Some(&log_dir)).unwrap();
    assert!(guard.is_some());
    assert!(log_dir.is_dir());

    tracing::info!("written to the rolling file");

    // Only one global subscriber per process
    assert!(init_logging(None).is_err());
  }
}
