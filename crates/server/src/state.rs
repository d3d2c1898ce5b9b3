//! Application state shared across request handlers.

use std::sync::Arc;

use crate::registry::ConnectionRegistry;

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}
