//! Store notifications.
//!
//! Uses tokio::sync::broadcast so every subscriber (grid, details view,
//! progress bar) receives every event.

use crate::icons::Icon;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Broadcast channel capacity.
/// One install sends at most 104 events (connecting, one per percentage step,
/// extracting, finished, status change). The rest is headroom for icon
/// deliveries arriving while a slow subscriber catches up.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Phase of a running install.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallPhase {
    Downloading,
    Extracting,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstallProgress {
    pub app: String,
    pub phase: InstallPhase,
    /// 0-100. Only known once the server announced a size.
    pub percentage: u8,
    pub status: String,
    /// e.g. `1.5 MB / 3 MB`. Empty outside of downloading.
    pub info: String,
}

/// Everything the store reports back to its consumers.
#[derive(Clone, Debug)]
pub enum StoreEvent {
    CatalogLoaded { count: usize },
    IconReady { url: String, icon: Icon },
    InstallProgress(InstallProgress),
    InstallFinished {
        app: String,
        success: bool,
        message: String,
    },
    /// Installed state of at least one app changed.
    AppStatusChanged,
}

/// Cloneable handle on the broadcast sender.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Send an event to all subscribers. Non-blocking.
    /// If nobody is listening the event is dropped.
    #[inline]
    pub fn send(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain all pending events from a receiver without blocking.
/// Lagged receivers skip what they missed and keep draining.
pub fn drain(rx: &mut Receiver<StoreEvent>) -> Vec<StoreEvent> {
    let mut events = Vec::new();

    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Empty) => break,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }

    events
}
