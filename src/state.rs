use crate::services::{invocation::RelaySettings, local_store::LocalStore};
use std::sync::Arc;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub store: LocalStore,
    pub settings: Arc<RelaySettings>,
}

impl AppState {
    pub fn new(store: LocalStore, settings: RelaySettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }
}
