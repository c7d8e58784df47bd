//! Store configuration.
//!
//! Built once at startup and handed to [`crate::CatalogService::new`]. Every
//! path and address the store touches comes from here.

use crate::error::StoreError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "TiwutLauncher";
const INSTALL_SUBDIR: &str = "TiwutApps";
const ICON_CACHE_SUBDIR: &str = "icon_cache";
const CONFIG_FILE: &str = "config.json";

/// Environment variable replacing the configured catalog address.
pub const CATALOG_URL_ENV: &str = "TIWUT_CATALOG_URL";

/// 10 MiB of encoded icon bytes.
pub const DEFAULT_ICON_MEMORY_BUDGET: usize = 10 * 1024 * 1024;

#[cfg(windows)]
const DEFAULT_CATALOG_URL: &str = "https://launcher.tiwut.de/library.tiwut";
#[cfg(not(windows))]
const DEFAULT_CATALOG_URL: &str = "https://launcher.tiwut.de/Linux/library.tiwut";

#[cfg(windows)]
const DEFAULT_ENTRY_POINT: &str = "main.exe";
#[cfg(not(windows))]
const DEFAULT_ENTRY_POINT: &str = "main.py";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Address of the catalog text file.
    pub catalog_url: String,
    /// Root for launcher-owned data.
    pub app_data_dir: PathBuf,
    /// Disk cache for downloaded icons, one file per icon filename.
    pub icon_cache_dir: PathBuf,
    /// Every app is unpacked into `<install_root>/<name>`.
    pub install_root: PathBuf,
    /// File that must exist at the top of an install directory to launch it.
    pub entry_point: String,
    /// External unpacker, invoked as `tool -x -f <archive> -C <dir>`.
    pub archive_tool: String,
    /// Cost budget of the in-memory icon cache, in encoded bytes.
    pub icon_memory_budget: usize,
    /// Per-request timeout. `None` waits forever.
    pub request_timeout_secs: Option<u64>,
    /// Where shortcuts are placed.
    pub shortcut_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        let app_data_dir = dirs::data_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join(APP_DIR_NAME);
        let documents = dirs::document_dir().unwrap_or_else(|| home.join("Documents"));

        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            icon_cache_dir: app_data_dir.join(ICON_CACHE_SUBDIR),
            app_data_dir,
            install_root: documents.join(INSTALL_SUBDIR),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            archive_tool: "tar".to_string(),
            icon_memory_budget: DEFAULT_ICON_MEMORY_BUDGET,
            request_timeout_secs: None,
            shortcut_dir: dirs::desktop_dir().unwrap_or_else(|| home.join("Desktop")),
        }
    }
}

impl StoreConfig {
    /// Config rooted somewhere other than the user's directories.
    /// Used by tests and portable setups.
    pub fn with_root(root: &Path) -> Self {
        let app_data_dir = root.join(APP_DIR_NAME);
        Self {
            icon_cache_dir: app_data_dir.join(ICON_CACHE_SUBDIR),
            app_data_dir,
            install_root: root.join(INSTALL_SUBDIR),
            shortcut_dir: root.join("Desktop"),
            ..Self::default()
        }
    }

    /// Load from config file, or return defaults if not found.
    /// The catalog address can be overridden via [`CATALOG_URL_ENV`].
    pub fn load(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => {
                debug!("No config at {:?}, using defaults", path);
                Self::default()
            }
        };

        if let Ok(url) = std::env::var(CATALOG_URL_ENV) {
            if !url.trim().is_empty() {
                config.catalog_url = url.trim().to_string();
            }
        }

        config
    }

    /// Save to config file
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Create the data, icon cache and install directories.
    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        for dir in [&self.app_data_dir, &self.icon_cache_dir, &self.install_root] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Install directory for an app identity.
    pub fn install_dir(&self, name: &str) -> PathBuf {
        self.install_root.join(name)
    }

    /// Entry point path for an app identity.
    pub fn entry_point_path(&self, name: &str) -> PathBuf {
        self.install_dir(name).join(&self.entry_point)
    }
}

/// Default location of the config file, e.g. `~/.config/TiwutLauncher/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE)
}
