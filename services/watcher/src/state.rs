//! Application state shared across request handlers.

use std::sync::Arc;

use crate::conflicts::ConflictResolver;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    resolver: ConflictResolver,
    host_ip: String,
}

impl AppState {
    pub fn new(resolver: ConflictResolver, host_ip: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                resolver,
                host_ip: host_ip.into(),
            }),
        }
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.inner.resolver
    }

    pub fn host_ip(&self) -> &str {
        &self.inner.host_ip
    }
}
