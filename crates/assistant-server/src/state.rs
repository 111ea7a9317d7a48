//! Application State

use std::sync::Arc;

use assistant_backends::AssistantService;

use crate::config::EnvProfiles;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Active backend, schema and conversations
    pub service: Arc<AssistantService>,

    /// Profiles usable by `/api/connect/env`
    pub profiles: Arc<EnvProfiles>,
}

impl AppState {
    pub fn new(service: AssistantService, profiles: EnvProfiles) -> Self {
        Self {
            service: Arc::new(service),
            profiles: Arc::new(profiles),
        }
    }
}
