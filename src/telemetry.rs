//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "shakestream.log";

/// Filter directives for the given logging settings. Explicit filter
/// directives win over `RUST_LOG`, which wins over the level.
pub fn filter_directives(logging: &LoggingConfig) -> String {
    if logging.verbose == 0 {
        if let Some(filter) = &logging.filter {
            return filter.clone();
        }
        if let Ok(env) = std::env::var("RUST_LOG") {
            return env;
        }
    }
    let level = logging.get_effective_level();
    format!("shakestream={level},shakestream_core={level},tower_http={level}")
}

/// Install the global subscriber. Keep the returned guard alive for the
/// life of the process; dropping it stops the background log writer.
pub fn init(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder().parse_lossy(filter_directives(logging));

    match &logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

            info!("File logging enabled to {}/{}", dir.display(), LOG_FILE_NAME);
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;
            Ok(None)
        }
    }
}
