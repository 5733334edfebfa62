//! Console + daily-rotated file logging.

use std::path::Path;

use anyhow::Context;
use notiflow_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const LOG_FILE_PREFIX: &str = "notiflow";
const LOG_RETENTION_DAYS: usize = 30;

const CRATES: [&str; 5] = [
    "notiflow",
    "notiflow_core",
    "notiflow_channels",
    "notiflow_scheduler",
    "notiflow_gateway",
];

fn default_filter(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    directives.push(format!("tower_http={}", if verbose { "debug" } else { "warn" }));
    directives.join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the config.
///
/// Keep the returned guard alive for the process lifetime, or buffered file
/// output is lost.
pub fn init(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level, verbose)));

    let console = fmt::layer().with_target(false).boxed();

    let (file, guard) = if config.file_enabled {
        let dir = Path::new(&config.directory);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(LOG_RETENTION_DAYS)
            .build(dir)
            .context("creating rolling log file")?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(guard)
}
