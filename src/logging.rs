//! Tracing subscriber setup.
//!
//! Logs always go to stderr. When a log file is configured, a daily rolling
//! file is added through a non-blocking writer; keep the returned guard
//! alive for as long as logs should be flushed.

use crate::config::LogSettings;
use crate::error::{EngineError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Install the global subscriber.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(settings))
        .with(fmt::layer().with_writer(std::io::stderr));

    match &settings.file {
        Some(path) => {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => std::path::PathBuf::from("."),
            };
            let prefix = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.log", crate::config::APP_ID));
            crate::config::ensure_dir(&dir)?;

            let appender = tracing_appender::rolling::daily(dir, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| EngineError::Config(format!("Failed to initialize logging: {}", e)))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| EngineError::Config(format!("Failed to initialize logging: {}", e)))?;
            Ok(None)
        }
    }
}
