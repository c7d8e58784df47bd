//! Store event listener.
//!
//! Subscribes to the store's broadcast channel and renders every event as a
//! line on stdout, the terminal stand-in for progress bars and message boxes.

use log::{debug, warn};
use std::sync::Arc;
use std::thread;
use tiwut_store::{CatalogService, InstallProgress, StoreEvent};
use tokio::sync::broadcast::error::RecvError;

/// Start the listener thread. It exits when the store is dropped.
pub fn start_listener(store: &Arc<CatalogService>) {
    let mut rx = store.subscribe();

    thread::spawn(move || {
        loop {
            match rx.blocking_recv() {
                Ok(event) => {
                    if let Some(line) = render(&event) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Notification listener lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Notification listener stopped");
    });
}

/// Text for an event, or `None` for events that only refresh views.
pub fn render(event: &StoreEvent) -> Option<String> {
    match event {
        StoreEvent::CatalogLoaded { count } => Some(format!("Library loaded: {} apps.", count)),
        StoreEvent::InstallProgress(progress) => Some(render_progress(progress)),
        StoreEvent::InstallFinished {
            success: true,
            message,
            ..
        } => Some(format!("Success: {}", message)),
        StoreEvent::InstallFinished {
            success: false,
            message,
            ..
        } => Some(format!("Error: {}", message)),
        StoreEvent::IconReady { url, icon } => {
            debug!("Icon ready: {} ({}x{})", url, icon.width, icon.height);
            None
        }
        StoreEvent::AppStatusChanged => None,
    }
}

fn render_progress(progress: &InstallProgress) -> String {
    if progress.info.is_empty() {
        format!("[{:>3}%] {}", progress.percentage, progress.status)
    } else {
        format!(
            "[{:>3}%] {} {}",
            progress.percentage, progress.status, progress.info
        )
    }
}
