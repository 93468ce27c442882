//! Shared process state handed to every axum handler via [`axum::extract::State`].

use std::sync::Arc;

use hearth_core::health::HealthProbe;
use hearth_workflow::Engine;

use crate::config::HearthConfig;

/// Everything a request handler needs: the wired engine, the config it was
/// built from, and the health probes recorded at startup.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<HearthConfig>,
    pub startup_probes: Arc<Vec<HealthProbe>>,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Engine, config: HearthConfig, startup_probes: Vec<HealthProbe>) -> Self {
        Self { engine: Arc::new(engine), config: Arc::new(config), startup_probes: Arc::new(startup_probes) }
    }
}
