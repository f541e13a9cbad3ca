//! # Fetcher
//!
//! Polls the configured sensors and streams their readings as tagged
//! records.
//!
//! Usage: `fetcher [CONFIG]` (default `config/fetcher.toml`). Records go to
//! `[acquisition] output`; logs go to stderr or the `[logging] file`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use fetcher::bus::open_linux_bus;
use fetcher::collectors;
use fetcher::config::{Config, LoggingConfig};
use fetcher::telemetry::{self, open_output, Acquisition, TelemetrySink};

/// Configuration used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/fetcher.toml";

/// Set up the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer on drop and must live until exit.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("invalid log level '{}'", logging.level))?;

    match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let prefix = path.file_name().context("logging file has no file name")?;

            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let _guard = init_logging(&config.logging)?;

    info!("Fetcher v{} starting...", env!("CARGO_PKG_VERSION"));
    if !collectors::check_unique_names() {
        anyhow::bail!("sensor registry has duplicate names");
    }
    info!("Known sensors: {}", collectors::names().collect::<Vec<_>>().join(", "));

    let bus = open_linux_bus(&config.bus.device)?;
    info!("I2C bus opened at: {}", config.bus.device);

    let mut acquisition = Acquisition::new(bus, &config)?;
    if acquisition.sensors().is_empty() {
        anyhow::bail!("no sensors could be opened");
    }

    let output = open_output(&config.acquisition.output)
        .with_context(|| format!("failed to open output {}", config.acquisition.output))?;
    let mut sink = TelemetrySink::new(output, config.acquisition.format);

    info!(
        "Polling {} sensors every {} ms ({:?} output)",
        acquisition.sensors().len(),
        config.acquisition.poll_interval_ms,
        config.acquisition.format
    );
    info!("Press Ctrl+C to exit");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };
    let polls = telemetry::run(&mut acquisition, &mut sink, config.poll_interval(), shutdown).await?;

    info!("Stopped after {} polls, {} records written", polls, sink.records());
    Ok(())
}
