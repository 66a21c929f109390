use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use capmux::config::{Config, LogFormat, LoggingConfig};
use capmux::gateway::{serve_stdio, GatewayServer};
use capmux::startup::{self, StartupLogger};
use capmux::{DEFAULT_CONFIG_FILE, VERSION};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging)?;

    if cli.check {
        info!(
            "Configuration {:?} is valid: {} target(s), {} prompt(s)",
            cli.config,
            config.targets.len(),
            config.prompts.len()
        );
        return Ok(());
    }

    startup::display_startup_banner(VERSION);

    let gateway = GatewayServer::from_config(&config).await.map_err(|e| {
        error!("Failed to start gateway: {}", e);
        e
    })?;

    let targets = gateway.list_targets().await;
    let config_path = cli.config.exists().then_some(cli.config.as_path());
    StartupLogger::display_startup_info(&config, config_path, &targets, VERSION);

    run_stdio_mode(Arc::clone(&gateway)).await;

    let report = gateway.close().await;
    if !report.is_clean() {
        warn!("{} target(s) failed to close cleanly", report.failures.len());
    }
    info!("Gateway '{}' stopped", gateway.id());
    Ok(())
}

/// Serve stdin/stdout until the input closes or Ctrl-C arrives
async fn run_stdio_mode(gateway: Arc<GatewayServer>) {
    tokio::select! {
        outcome = serve_stdio(Arc::clone(&gateway)) => {
            if let Err(e) = outcome {
                error!("stdio serve loop failed: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the protocol, so logs go to stderr
    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}
