//! jmx-bridge library
//!
//! Scrapes JMX bean attributes, either from an in-process bean registry or
//! from a remote JVM through a Jolokia agent, and translates them into
//! Prometheus metrics with a configurable rule set.

pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod scraper;
pub mod server;
pub mod transformer;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging subsystem
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error).
///   `RUST_LOG` takes precedence when set.
/// * `json` - Emit one JSON object per event instead of plain text
///
/// # Errors
/// Returns an error if the logging system fails to initialize
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
