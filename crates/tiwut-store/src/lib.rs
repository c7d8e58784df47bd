//! tiwut-store: app catalog, icon cache and installer for the Tiwut launcher.
//!
//! Provides a single service for:
//! - Fetching and parsing the remote `name;download;website[;icon]` catalog
//! - Icon lookup through a memory LRU, a disk cache and the network
//! - Downloading, unpacking, launching and removing apps
//! - Broadcasting progress and results to any number of subscribers

mod catalog;
mod config;
mod error;
mod events;
mod format;
mod icons;
mod install;
mod service;
mod transport;

pub use catalog::{AppRecord, filter_apps, is_valid_app_name, parse_catalog, parse_line};
pub use config::{CATALOG_URL_ENV, DEFAULT_ICON_MEMORY_BUDGET, StoreConfig, default_config_path};
pub use error::StoreError;
pub use events::{CHANNEL_CAPACITY, EventBus, InstallPhase, InstallProgress, StoreEvent, drain};
pub use format::format_bytes;
pub use icons::{Icon, IconCache};
pub use install::{InstallManager, InstallSession, UninstallOutcome};
pub use service::CatalogService;
pub use transport::{Download, HttpTransport, Transport};
