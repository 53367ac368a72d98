use crate::persistence::ToolIndexStore;
use crate::protocol::DiscoveryService;
use std::sync::atomic::{AtomicBool, Ordering};

/// Application state shared across all request handlers.
pub struct AppState {
    pub service: DiscoveryService,
    pub store: ToolIndexStore,
    /// Set once start-up has finished and the server may take traffic.
    pub ready: AtomicBool,
}

impl AppState {
    pub fn new(service: DiscoveryService, store: ToolIndexStore) -> Self {
        Self {
            service,
            store,
            ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
