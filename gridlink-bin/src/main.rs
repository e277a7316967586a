use clap::Parser;
use gridlink_common::Logger;
use gridlink_core::Gateway;
use gridlink_error::{GatewayError, GwResult};
use gridlink_iec104::{Iec104Server, ServerConfig};
use gridlink_iec61850::Iec61850InputHandler;
use gridlink_models::{constants::DEFAULT_CONFIG_FILE_NAME, Settings};
use gridlink_modbus::ModbusInputHandler;
use std::{env::current_dir, path::PathBuf};
use tracing::info;

/// Gridlink - field-to-SCADA protocol translation gateway
///
/// Ingests telemetry from IEC 61850 and Modbus TCP field devices,
/// normalises it into a latest-value point store and serves it to SCADA
/// masters over IEC 60870-5-104 (general interrogation and spontaneous
/// transmission).
#[derive(Parser)]
#[command(name = "gridlink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Gridlink gateway", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, the gateway looks for 'gridlink.toml' in the
    /// current working directory.
    #[arg(short, long, env = "GRIDLINK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> GwResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| GatewayError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };

    let mut logger = Logger::new(None);
    logger.initialize()?;

    let settings = Settings::new(config_path.to_string_lossy().as_ref())?;

    let gateway = Gateway::new(&settings);
    let store = gateway.store();

    gateway
        .register(Iec61850InputHandler::new(store.clone()))
        .await;
    gateway.register(ModbusInputHandler::new(store.clone())).await;
    gateway
        .register(Iec104Server::new(
            ServerConfig::from(&settings.server),
            store,
        ))
        .await;

    gateway.start().await?;
    info!(
        "Gateway running, 104 server on {}:{}",
        settings.server.bind_ip, settings.server.port
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| GatewayError::from(format!("Failed to listen for shutdown signal: {e}")))?;
    info!("Shutdown signal received");

    gateway.stop().await;
    Ok(())
}
