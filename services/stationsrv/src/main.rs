//! Station Controller (stationsrv)
//!
//! Scanner in, MES chain, PLC verdict out.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use stationsrv::core::bootstrap::{self, Args};
use stationsrv::core::config::{ConfigManager, FileConfigStore};
use stationsrv::core::mes::HttpMesClient;
use stationsrv::StationRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let service_info = bootstrap::service_info();

    // Logging settings live in the configuration, so load it first
    let config_manager = ConfigManager::from_file(&args.config)?;
    bootstrap::initialize_logging(&args, &service_info, config_manager.config())?;
    if !args.no_color {
        common::service_bootstrap::print_startup_banner(&service_info);
    }

    if let Err(e) = bootstrap::validate_configuration(&config_manager) {
        error!("Configuration invalid: {}", e);
        common::logging::flush();
        return Err(e.into());
    }
    if args.validate {
        info!("Validation completed successfully");
        common::logging::flush();
        return Ok(());
    }

    let config = config_manager.into_config();
    let mes = Arc::new(HttpMesClient::new(&config.mes)?);
    let store = Arc::new(FileConfigStore::new(&args.config)?);

    info!("Starting {} service", config.service.name);
    let runtime = StationRuntime::new(config, mes, store);
    runtime.start().await?;

    tokio::select! {
        signal = common::shutdown::wait_for_shutdown() => {
            info!("Shutdown signal received: {}", signal);
        }
        _ = runtime.halted() => {
            error!("Station halted: batch material exhausted, replace the package and restart");
        }
    }

    runtime.stop().await;
    info!("Service shutdown complete");
    common::logging::flush();
    Ok(())
}
