//! Logging setup for the histwx binary
//!
//! - `RUST_LOG` respected; defaults to "info,histwx=debug"
//! - text or JSON lines on stdout
//! - optionally a dated plain-text copy under a log directory

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const DEFAULT_FILTER: &str = "info,histwx=debug";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ObsError {
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// `histwx_YYYYMMDD.log`
pub fn log_file_name(date: NaiveDate) -> String {
    format!("histwx_{}.log", date.format("%Y%m%d"))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Returns the path of the log file when `log_dir` is given; the file is
/// appended to, so several runs on one day share it.
pub fn init(
    service_name: &str,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Result<Option<PathBuf>, ObsError> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    });

    let log_path = match log_dir {
        Some(dir) => {
            let path = dir.join(log_file_name(Local::now().date_naive()));
            let file = open_log_file(&path)?;
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            );
            Some(path)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(EnvFilter::new(env_filter))
        .try_init()
        .map_err(|e| ObsError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(service = %service_name, ?format, "Logging initialized");
    Ok(log_path)
}

fn open_log_file(path: &Path) -> Result<fs::File, ObsError> {
    let error = |source| ObsError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(error)
}
