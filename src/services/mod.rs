//! Background services for the launcher.
//!
//! - `notifications` - prints store events (progress, results) as they arrive

pub mod notifications;

use log::info;
use std::sync::Arc;
use tiwut_store::CatalogService;

/// Start all background services.
/// Call this once from main before loading the catalog.
pub fn start_all(store: &Arc<CatalogService>) {
    info!("Starting background services...");
    notifications::start_listener(store);
}
