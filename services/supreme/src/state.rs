//! Application state shared across request handlers.

use std::sync::Arc;

use crate::coordinator::Coordinator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    coordinator: Coordinator,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            inner: Arc::new(AppStateInner { coordinator }),
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }
}
