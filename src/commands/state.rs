//! Shared application state handed to every command handler.

use std::sync::Arc;

use crate::core::{PingProbe, Probe, ProcessProvider, SysinfoProvider};
use crate::services::JobRegistry;

/// Shared application state.
pub struct AppState {
    pub registry: JobRegistry,
    /// Used directly for listings and manual kills, and by the watchdog.
    pub provider: Arc<dyn ProcessProvider>,
    /// Used directly for single pings, and by the net-load sampler.
    pub probe: Arc<dyn Probe>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ProcessProvider>, probe: Arc<dyn Probe>) -> Self {
        Self {
            registry: JobRegistry::new(Arc::clone(&provider), Arc::clone(&probe)),
            provider,
            probe,
        }
    }

    /// State wired to the real OS collaborators (`sysinfo` and system `ping`).
    pub fn system() -> Self {
        Self::new(Arc::new(SysinfoProvider::new()), Arc::new(PingProbe))
    }
}
