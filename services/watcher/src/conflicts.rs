//! Conflict resolver: the node's single source of truth for CPU quotas.
//!
//! Every admission decision runs under one lock, including the container
//! lookup and the resulting quota writes, so writes on a node are applied in
//! the order the decisions were made and the fair-share computation always
//! sees a consistent registry.

use std::sync::Arc;

use seqclock_request::{Request, ResetRequest};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::controller::QuotaBounds;
use crate::error::ResolverError;
use crate::registry::{QuotaWrite, Registry, RegistrySnapshot};
use crate::runtime::{ContainerRuntime, ROLE_USER_ACTION};

pub struct ConflictResolver {
    registry: Mutex<Registry>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ConflictResolver {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, cores: i64, bounds: QuotaBounds) -> Self {
        Self {
            registry: Mutex::new(Registry::new(cores, bounds)),
            runtime,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub async fn registry_contains(&self, function: &str) -> bool {
        self.registry.lock().await.contains(function)
    }

    /// Admit or update a demand.
    ///
    /// The first demand for a function locates its container; if none runs on
    /// this node the call fails with `ContainerNotFound`.
    pub async fn update_registry(&self, request: &Request) -> Result<(), ResolverError> {
        request.validate()?;

        let mut registry = self.registry.lock().await;
        if !registry.contains(&request.function) {
            let container = self
                .runtime
                .find_container(&request.function, ROLE_USER_ACTION)
                .await?
                .ok_or_else(|| ResolverError::ContainerNotFound(request.function.clone()))?;
            debug!(
                function = %request.function,
                container_id = %container.short_id(),
                "Tracking function container"
            );
            registry.track(request.function.clone(), container.id);
        }

        let writes = registry.update(request)?;
        info!(
            request_id = request.id,
            function = %request.function,
            quota_writes = writes.len(),
            lambda = registry.lambda(),
            "Request admitted"
        );
        self.apply(&writes).await;
        Ok(())
    }

    /// Release a demand.
    pub async fn remove_from_registry(&self, reset: &ResetRequest) -> Result<(), ResolverError> {
        reset.validate()?;

        let mut registry = self.registry.lock().await;
        let writes = registry.remove(reset)?;
        info!(
            request_id = reset.id,
            function = %reset.function,
            tracked = registry.contains(&reset.function),
            lambda = registry.lambda(),
            "Request released"
        );
        self.apply(&writes).await;
        Ok(())
    }

    pub async fn export_registry(&self) -> RegistrySnapshot {
        self.registry.lock().await.snapshot()
    }

    /// Write quotas to containers. Failures are logged and absorbed.
    async fn apply(&self, writes: &[QuotaWrite]) {
        for write in writes {
            if let Err(e) = self
                .runtime
                .update_cpu_quota(&write.container_id, write.quota)
                .await
            {
                warn!(
                    error = %e,
                    container_id = %write.container_id,
                    quota = write.quota,
                    "Failed to update container CPU quota"
                );
            }
        }
    }
}
