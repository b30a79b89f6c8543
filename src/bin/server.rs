//! ipgeo-server: IP geolocation HTTP service.

use clap::Parser;
use ipgeo::registry::REQUIRED_KINDS;
use ipgeo::{ensure_config_file, server, Config, HttpFetcher, LifecycleManager, Registry};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ipgeo-server")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Serve IP geolocation lookups from MaxMind databases", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = ensure_config_file(&cli.config) {
        log::warn!("Error creating configuration file: {}", e);
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Error loading configuration: {}", e);
            log::info!("Using default configuration");
            Config::default()
        }
    };
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    fs::create_dir_all(&config.database_dir)
        .map_err(|e| format!("Failed to create database directory: {}", e))?;

    let registry = Arc::new(Registry::from_specs(config.database_specs()));
    registry.require(&REQUIRED_KINDS)?;

    let manager = Arc::new(
        LifecycleManager::new(Arc::clone(&registry))
            .with_fetcher(HttpFetcher::with_timeout(config.download_timeout()))
            .with_policy(config.refresh_policy()),
    );
    manager
        .initialize()
        .map_err(|e| format!("Error initializing databases: {}", e))?;
    Arc::clone(&manager).spawn_refresher()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(&config, registry))?;
    Ok(())
}
