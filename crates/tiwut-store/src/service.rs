//! Catalog service.
//!
//! Owns the parsed catalog, the icon cache and the install manager, and is the
//! single entry point for the presentation layer. Results come back as return
//! values for synchronous calls and as [`StoreEvent`]s for background work.

use crate::catalog::{AppRecord, filter_apps, parse_catalog};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::events::{EventBus, StoreEvent};
use crate::icons::{Icon, IconCache};
use crate::install::{InstallManager, UninstallOutcome};
use crate::transport::{HttpTransport, Transport};
use log::info;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

pub struct CatalogService {
    config: Arc<StoreConfig>,
    transport: Arc<dyn Transport>,
    /// Apps in catalog order.
    apps: RwLock<Vec<AppRecord>>,
    icons: IconCache,
    /// Icon addresses with a download running in the background.
    icons_in_flight: Mutex<HashSet<String>>,
    installer: InstallManager,
    events: EventBus,
}

impl CatalogService {
    /// Service talking HTTP through ureq.
    pub fn new(config: StoreConfig) -> Self {
        let timeout = config.request_timeout_secs.map(Duration::from_secs);
        Self::with_transport(config, Arc::new(HttpTransport::new(timeout)))
    }

    pub fn with_transport(config: StoreConfig, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        let events = EventBus::new();

        Self {
            icons: IconCache::new(
                config.icon_cache_dir.clone(),
                config.icon_memory_budget,
                transport.clone(),
            ),
            icons_in_flight: Mutex::new(HashSet::new()),
            installer: InstallManager::new(config.clone(), transport.clone(), events.clone()),
            apps: RwLock::new(Vec::new()),
            config,
            transport,
            events,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Subscribe to store notifications.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Fetch and parse the catalog, replacing the current app list.
    /// On error the previous list is kept.
    pub fn load_catalog(&self) -> Result<usize, StoreError> {
        info!("Loading catalog from {}", self.config.catalog_url);

        let bytes = self.transport.get(&self.config.catalog_url)?.into_bytes()?;
        let apps = parse_catalog(&String::from_utf8_lossy(&bytes));
        let count = apps.len();
        *self.apps.write().unwrap() = apps;

        info!("Catalog loaded: {} apps", count);
        self.events.send(StoreEvent::CatalogLoaded { count });
        Ok(count)
    }

    pub fn all_apps(&self) -> Vec<AppRecord> {
        self.apps.read().unwrap().clone()
    }

    pub fn installed_apps(&self) -> Vec<AppRecord> {
        self.apps
            .read()
            .unwrap()
            .iter()
            .filter(|app| self.installer.is_installed(app))
            .cloned()
            .collect()
    }

    /// All apps whose name contains `term`, ignoring case.
    pub fn search(&self, term: &str) -> Vec<AppRecord> {
        filter_apps(&self.apps.read().unwrap(), term)
    }

    /// Installed apps whose name contains `term`, ignoring case.
    pub fn search_installed(&self, term: &str) -> Vec<AppRecord> {
        filter_apps(&self.installed_apps(), term)
    }

    /// Look an app up by its exact name.
    pub fn find_app(&self, name: &str) -> Option<AppRecord> {
        self.apps
            .read()
            .unwrap()
            .iter()
            .find(|app| app.name == name)
            .cloned()
    }

    pub fn is_installed(&self, app: &AppRecord) -> bool {
        self.installer.is_installed(app)
    }

    pub fn active_install(&self) -> Option<String> {
        self.installer.active_install()
    }

    /// Resolve an icon on the calling thread, downloading it if needed.
    pub fn icon(&self, app: &AppRecord) -> Option<Icon> {
        self.icons.resolve(&app.icon_url)
    }

    /// Deliver an app's icon as [`StoreEvent::IconReady`].
    ///
    /// Cached icons are sent immediately. Otherwise a download runs in the
    /// background and its handle is returned; a failed download sends nothing.
    /// An address already being downloaded is not requested again, its
    /// running download delivers the event.
    pub fn request_icon(self: &Arc<Self>, app: &AppRecord) -> Option<JoinHandle<()>> {
        if !app.has_icon() {
            return None;
        }

        let url = app.icon_url.clone();
        if let Some(icon) = self.icons.lookup_local(&url) {
            self.events.send(StoreEvent::IconReady { url, icon });
            return None;
        }

        if !self.lock_in_flight().insert(url.clone()) {
            return None;
        }

        let service = Arc::clone(self);
        Some(thread::spawn(move || {
            let icon = service.icons.fetch(&url);
            service.lock_in_flight().remove(&url);
            if let Some(icon) = icon {
                service.events.send(StoreEvent::IconReady { url, icon });
            }
        }))
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.icons_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start installing `app` in the background.
    ///
    /// Returns [`StoreError::Busy`] right away if another install is running.
    /// Progress and the outcome arrive as events; the handle yields the same outcome.
    pub fn install(
        self: &Arc<Self>,
        app: &AppRecord,
    ) -> Result<JoinHandle<Result<(), StoreError>>, StoreError> {
        let session = self.installer.begin(app)?;
        let service = Arc::clone(self);
        Ok(thread::spawn(move || service.installer.run(session)))
    }

    /// Install on the calling thread.
    pub fn install_blocking(&self, app: &AppRecord) -> Result<(), StoreError> {
        let session = self.installer.begin(app)?;
        self.installer.run(session)
    }

    pub fn uninstall(
        &self,
        app: &AppRecord,
        confirm: impl FnOnce(&AppRecord) -> bool,
    ) -> Result<UninstallOutcome, StoreError> {
        self.installer.uninstall(app, confirm)
    }

    pub fn launch(&self, app: &AppRecord) -> Result<(), StoreError> {
        self.installer.launch(app)
    }

    pub fn create_shortcut(&self, app: &AppRecord) -> Result<PathBuf, StoreError> {
        self.installer.create_shortcut(app)
    }
}
