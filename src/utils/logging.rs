use std::{path::Path, sync::LazyLock};

use anyhow::{anyhow, Result};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{format::FmtSpan, writer::MakeWriterExt},
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "liftlog";
const KEPT_LOG_FILES: usize = 5;

pub struct LogOptions<'a> {
    /// Application directory, logs go into its `logs` subdirectory.
    pub dir: &'a Path,
    /// Overrides `RUST_LOG`.
    pub level: Option<LevelFilter>,
    /// Mirror the log to stderr. Stdout is kept for command output.
    pub console: bool,
}

fn crate_filter(level: impl std::fmt::Display) -> EnvFilter {
    EnvFilter::new(format!(
        "{}={level}",
        env!("CARGO_PKG_NAME").replace('-', "_")
    ))
}

pub fn enable_logging(options: LogOptions<'_>) -> Result<()> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(KEPT_LOG_FILES)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(options.dir.join("logs"))?;

    let console = options.console;
    let stderr = std::io::stderr.with_filter(move |_| console);

    let filter = match options.level {
        Some(level) => crate_filter(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| crate_filter(LevelFilter::INFO)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stderr.and(appender))
        .pretty()
        .try_init()
        .map_err(|e| anyhow!("Failed to set up logging: {e}"))
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(crate_filter(LevelFilter::TRACE))
        .with_test_writer()
        .try_init();
});
