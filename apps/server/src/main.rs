//! Resonate Server - standalone server for synchronized multi-room audio
//! streaming.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use resonate_core::events::BroadcastEventBridge;
use resonate_core::model::ServerInfo;
use resonate_core::protocol_constants::EVENT_CHANNEL_CAPACITY;
use resonate_core::server::Server;
use resonate_core::{start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Resonate Server - headless synchronized multi-room audio streaming server.
#[derive(Parser, Debug)]
#[command(name = "resonate-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "RESONATE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file and environment).
    #[arg(short = 'p', long, env = "RESONATE_BIND_PORT")]
    port: Option<u16>,

    /// Bind address (overrides config file and environment).
    #[arg(short = 'a', long, env = "RESONATE_BIND_ADDR")]
    bind_addr: Option<std::net::IpAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Resonate Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(addr) = args.bind_addr {
        config.bind_addr = addr;
    }

    let server_info = ServerInfo {
        id: uuid::Uuid::new_v4().to_string(),
        name: config.server_name.clone(),
    };

    let event_bridge = Arc::new(BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY));
    let server = Arc::new(Server::new(server_info, Arc::clone(&event_bridge)));
    for group_id in &config.default_groups {
        server.add_group(group_id.clone());
        log::info!("[Server] pre-created group {}", group_id);
    }

    let dispatch_handle = server.spawn_dispatch_loop();

    let app_state = AppState::new(Arc::clone(&server), event_bridge, config.max_client_backlog);
    let addr = SocketAddr::new(config.bind_addr, config.bind_port);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, addr).await {
            log::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    server.stop();
    server_handle.abort();
    dispatch_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
