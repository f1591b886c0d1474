use std::fs::File;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::{LogFormat, LoggingConfig};

/// Target of the cache layer's debug events
const CACHE_TARGET: &str = "planetperm_core::cache";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level` when set. Fails if a subscriber is
/// already installed or the level is not recognised.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = build_filter(config)?;
    let writer = config.file_path.as_deref().map(open_log_file).transpose()?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format, writer) {
        (LogFormat::Json, Some(file)) => json_layer().with_writer(file).boxed(),
        (LogFormat::Json, None) => json_layer().boxed(),
        (LogFormat::Pretty, Some(file)) => pretty_layer().with_writer(file).boxed(),
        (LogFormat::Pretty, None) => pretty_layer().boxed(),
        (LogFormat::Compact, Some(file)) => fmt::layer().compact().with_writer(file).boxed(),
        (LogFormat::Compact, None) => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;
    Ok(())
}

fn json_layer<S>() -> fmt::Layer<S, fmt::format::JsonFields, fmt::format::Format<fmt::format::Json>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_target(true)
        .with_line_number(true)
}

fn pretty_layer<S>() -> fmt::Layer<S, fmt::format::Pretty, fmt::format::Format<fmt::format::Pretty>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer().pretty().with_target(true).with_file(false)
}

fn open_log_file(path: &str) -> anyhow::Result<Arc<File>> {
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let level = parse_log_level(&config.level)?;
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    if config.cache_events {
        filter = filter.add_directive(format!("{CACHE_TARGET}=debug").parse()?);
    }
    Ok(filter)
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
