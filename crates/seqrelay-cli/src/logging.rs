//! Tracing subscriber setup.
//!
//! The console gets `RUST_LOG` (or `info`, `debug` with `--verbose`). When
//! `logging.directory` is configured, every event at `debug` and above is
//! also appended to `<directory>/<component>.log`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use seqrelay_types::config::LoggingConfig;

/// Install the global subscriber. Returns the log file path, if any.
pub fn init(verbose: bool, logging: &LoggingConfig) -> anyhow::Result<Option<PathBuf>> {
    let default_filter = if verbose { "debug" } else { "info" };
    let console = fmt::layer().with_target(false).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
    );

    let (file_layer, path) = match logging.directory.as_deref() {
        Some(dir) => {
            let (file, path) = open_log_file(Path::new(dir), &logging.component)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(path)
}

fn open_log_file(dir: &Path, component: &str) -> anyhow::Result<(File, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = dir.join(format!("{component}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    Ok((file, path))
}
