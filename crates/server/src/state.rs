use std::sync::Arc;

use modelbridge_core::{Config, LifecycleController, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    lifecycle: Arc<LifecycleController>,
}

impl AppState {
    pub fn new(config: Config, lifecycle: Arc<LifecycleController>) -> Self {
        Self { config, lifecycle }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        self.lifecycle.as_ref()
    }
}
