//! Tiwut Launcher - terminal front-end for the Tiwut app store.
//!
//! Loads the catalog once at startup, then serves library/installed/details
//! pages and install actions from an interactive prompt.

mod pages;
mod services;
mod shell;

use log::{error, info};
use std::error::Error;
use std::sync::Arc;
use tiwut_store::{CatalogService, StoreConfig, default_config_path};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting Tiwut Launcher...");

    let config_path = default_config_path();
    let config = StoreConfig::load(&config_path);
    config.ensure_dirs()?;
    info!("Installing apps into {:?}", config.install_root);

    let store = Arc::new(CatalogService::new(config));
    services::start_all(&store);

    // Without a catalog there is nothing to show
    if let Err(e) = store.load_catalog() {
        error!("Failed to load catalog: {}", e);
        eprintln!("Could not load app library:\n{}", e);
        std::process::exit(1);
    }

    let stdin = std::io::stdin();
    shell::run(&store, &mut stdin.lock())?;

    info!("Tiwut Launcher exiting.");
    Ok(())
}
