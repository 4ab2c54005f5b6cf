use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const TRACE_FILE: &str = "trace.log";
pub const FILTER_ENV: &str = "MODNEST_LOG";

/// Installs the file subscriber. The returned guard flushes pending lines on
/// drop and has to live as long as the process.
pub fn init(data_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(data_dir).context("create data dir")?;
    let appender = tracing_appender::rolling::never(data_dir, TRACE_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}
