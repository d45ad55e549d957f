/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running watch tasks with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wirebook_adapter::{RestClient, StreamClient};
use wirebook_monitor::{MonitorConfig, WatchExit, spawn_watchers};

#[derive(Parser, Debug)]
#[command(name = "wirebook-monitor", version, about = "Follow exchange streams and log cache updates")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Validate configuration and build the client without connecting
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting wirebook-monitor"
    );

    let config = load_config(&args.config_path)?;
    info!(watch_count = config.watches.len(), "configuration loaded");

    let client = Arc::new(build_client(&config)?);

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let handles = spawn_watchers(client.clone(), config.watches.clone(), shutdown.clone());
    info!(watch_count = handles.len(), "watches started");

    shutdown.cancelled().await;
    info!("shutdown signal received");

    for handle in handles {
        match handle.await {
            Ok(WatchExit::Shutdown) => {}
            Ok(WatchExit::Failed(err)) => warn!(error = %err, "watch ended with error"),
            Err(err) => warn!(error = %err, "watch task panicked"),
        }
    }

    client.close().await;
    info!("connections closed");
    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<MonitorConfig> {
    let path_str = path.to_str().context("config path must be valid utf-8")?;
    let config = MonitorConfig::from_file(path_str).context("load config")?;
    config.validate().context("validate config")?;
    Ok(config)
}

fn build_client(config: &MonitorConfig) -> Result<StreamClient> {
    let mut builder = StreamClient::builder()
        .public_url(config.public_url.clone())
        .private_url(config.private_url().to_string())
        .config(config.stream.clone());

    let credentials = config.resolve_credentials()?;
    if let Some(rest_url) = &config.rest_url {
        let mut rest = RestClient::new(rest_url).context("build rest client")?;
        if let Some(credentials) = &credentials {
            rest.set_credentials(credentials.clone());
        }
        builder = builder.fetcher(Arc::new(rest));
    }
    if let Some(credentials) = credentials {
        builder = builder.credentials(credentials);
    }
    for (symbol, market_id) in &config.markets {
        builder = builder.market(symbol.clone(), market_id.clone());
    }
    builder.build().context("build stream client")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
