//! Subscriber setup: compact stderr output filtered by `RUST_LOG` (default
//! `warn`), plus a daily rolling file with everything at debug and above.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{
  filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Install the global subscriber. Keep the returned guard alive for the
/// process lifetime so buffered file output is flushed.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
  let default_level = if verbose { "debug" } else { "warn" };
  let console_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let console_layer = fmt::layer()
    .compact()
    .with_target(false)
    .with_writer(std::io::stderr)
    .with_filter(console_filter);

  let (file_layer, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, "civic.log"));
      let layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::DEBUG);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(console_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
