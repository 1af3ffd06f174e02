//! Sonos Control Server - standalone headless server for the control core.
//!
//! Discovers speakers on the local network, keeps the registry fresh, and
//! serves the health, event stream and announcement audio endpoints.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sonos_control_core::{bootstrap_services, start_server, LocalIpDetector, NetworkContext};
use tokio::signal;

use crate::config::ServerConfig;

/// Sonos Control Server - headless device-session core for Sonos speakers.
#[derive(Parser, Debug)]
#[command(name = "sonos-control-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SONOS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long)]
    advertise_ip: Option<std::net::IpAddr>,

    /// Directory for rendered announcements (overrides config file).
    #[arg(long, value_name = "DIR")]
    tts_cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .filter_module("hyper_util", log::LevelFilter::Warn)
        .format_timestamp_millis()
        .init();

    log::info!("Sonos Control Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(dir) = args.tts_cache_dir {
        config.tts_cache_dir = dir;
    }

    // Resolve advertise IP: use explicit config, or fall back to auto-detection
    let network = if let Some(ip) = config.advertise_ip {
        log::info!(
            "Configuration: bind_port={}, advertise_ip={}",
            config.bind_port,
            ip
        );
        NetworkContext::explicit(config.bind_port, ip)
    } else {
        log::info!(
            "Configuration: bind_port={}, advertise_ip=auto",
            config.bind_port
        );
        NetworkContext::auto_detect(config.bind_port, LocalIpDetector::arc()).context(
            "Failed to auto-detect local IP address. \
             Please specify --advertise-ip or set SONOS_ADVERTISE_IP to the IP \
             address that Sonos speakers can reach.",
        )?
    };

    let services = bootstrap_services(config.to_core_config(), network)
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Serve first so speakers can fetch audio as soon as the registry fills
    let app_state = services.app_state();
    let shutdown = services.cancel_token.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    services.start().await;
    log::info!(
        "Registry started with {} speaker(s)",
        services.registry.snapshot().len()
    );

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown also stops the HTTP server
    services.shutdown().await;

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
