//! Log output for the demo binary.
//!
//! Stdout carries the streamed answer, so logs go to stderr, or to a
//! JSON-lines file when one is given.

use std::error::Error;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub struct LogSettings {
    /// Number of `-v` flags.
    pub verbose: u8,
    pub json_file: Option<PathBuf>,
}

fn verbosity_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,chatmd_stream=info,chatmd_demo=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` applies only when no `-v` flag was given.
fn build_filter(verbose: u8, rust_log: Option<&str>) -> EnvFilter {
    if verbose == 0
        && let Some(directives) = rust_log
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }
    EnvFilter::new(verbosity_directive(verbose))
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>, Box<dyn Error>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(settings.verbose, rust_log.as_deref());
    match &settings.json_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .try_init()
                .map_err(|e| -> Box<dyn Error> { e })?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .compact()
                .with_target(false)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| -> Box<dyn Error> { e })?;
            Ok(None)
        }
    }
}
