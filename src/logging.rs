//! Subscriber setup for the CLI. Events go to stderr so command output on
//! stdout stays clean; a daily rolling file is added when `log_dir` is set.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered file output is flushed.
pub fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let file = config.log_dir.as_deref().map(|dir| (dir, file_writer(dir)));
    let (writer, guard, failure) = match file {
        Some((_, Ok((writer, guard)))) => (Some(writer), Some(guard), None),
        Some((dir, Err(err))) => (None, None, Some((dir, err))),
        None => (None, None, None),
    };
    let file_layer = writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(file_layer)
        .init();

    if let Some((dir, err)) = failure {
        tracing::warn!(log_dir = %dir.display(), error = %err, "file logging disabled");
    }
    guard
}

fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("adaptive-learning")
        .filename_suffix("log")
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}
