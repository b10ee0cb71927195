//! jmx-bridge - rule-based JMX to Prometheus exporter
//!
//! Serves a Prometheus metrics endpoint backed by JMX beans, read from the
//! in-process registry or a remote Jolokia agent.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use jmx_bridge::cli::{Cli, OutputFormat};
use jmx_bridge::config::Config;
use jmx_bridge::exporter::Exporter;
use jmx_bridge::server;
use jmx_bridge::transformer::PrometheusFormatter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    jmx_bridge::init_logging(&cli.log_level.to_string(), cli.log_json)?;

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    if cli.validate {
        return print_validation(&config, cli.output_format);
    }

    let exporter = Exporter::new(config)?;
    let exporter = if cli.config.exists() {
        exporter.watching(&cli.config)
    } else {
        exporter
    };

    if cli.dry_run {
        return dry_run(&exporter, cli.output_format).await;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting jmx-bridge");
    server::run(Arc::new(exporter)).await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReport<'a> {
    valid: bool,
    rules: usize,
    target: &'a str,
    config: &'a Config,
}

fn print_validation(config: &Config, format: OutputFormat) -> Result<()> {
    let rules = config.rule_set()?;
    let report = ValidationReport {
        valid: true,
        rules: rules.len(),
        target: config.remote_url().unwrap_or("in-process"),
        config,
    };

    match format {
        OutputFormat::Text => {
            println!("Configuration is valid");
            println!("  target: {}", report.target);
            println!(
                "  server: {}:{}{}",
                config.server.bind_address, config.server.port, config.server.path
            );
            println!("  rules: {}", report.rules);
            for rule in &rules {
                println!(
                    "    [{}] pattern={} name={} type={}",
                    rule.id,
                    rule.pattern_source().unwrap_or("<any>"),
                    rule.name.as_deref().unwrap_or("<default>"),
                    rule.metric_type
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&report)?),
    }
    Ok(())
}

async fn dry_run(exporter: &Exporter, format: OutputFormat) -> Result<()> {
    let snapshots = exporter.collect().await?;

    match format {
        OutputFormat::Text => print!("{}", PrometheusFormatter::new().format(&snapshots)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshots)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&snapshots)?),
    }
    Ok(())
}
