//! Container runtime capability.
//!
//! The resolver needs two things from the node's container runtime: locate
//! the container backing a function, and change a container's CPU quota.
//!
//! - [`DockerRuntime`] talks to the Docker Engine API on its unix socket.
//! - [`MockRuntime`] keeps containers in memory and records every quota
//!   write, for tests and local development.

mod docker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RuntimeError;

pub use docker::{DockerRuntime, DEFAULT_DOCKER_SOCKET};

/// Container name label value for OpenWhisk action containers.
pub const ROLE_USER_ACTION: &str = "user-action";

/// Container name label value for pod sandbox containers.
pub const ROLE_POD: &str = "POD";

/// Label carrying the container's role inside its pod.
pub const CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

/// Label carrying the owning pod name.
pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";

/// Metadata of a container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
}

impl ContainerSummary {
    /// Short form of the container ID, as printed by `docker ps`.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(10) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Container runtime interface.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Find the container with the given role serving `function`.
    async fn find_container(
        &self,
        function: &str,
        role: &str,
    ) -> Result<Option<ContainerSummary>, RuntimeError>;

    /// Set the CPU quota of a container. `-1` lifts the restriction.
    async fn update_cpu_quota(&self, container_id: &str, quota: i64) -> Result<(), RuntimeError>;
}

/// In-memory runtime.
#[derive(Debug, Default)]
pub struct MockRuntime {
    /// Containers keyed by the function they serve.
    containers: Mutex<HashMap<String, ContainerSummary>>,

    /// Every quota write, in order.
    writes: Mutex<Vec<(String, i64)>>,

    fail_lookups: AtomicBool,
    fail_updates: AtomicBool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action container for `function`.
    pub fn with_container(self, function: &str, container_id: &str) -> Self {
        self.add_container(function, container_id);
        self
    }

    pub fn add_container(&self, function: &str, container_id: &str) {
        let mut labels = HashMap::new();
        labels.insert(CONTAINER_NAME_LABEL.to_string(), ROLE_USER_ACTION.to_string());
        labels.insert(
            POD_NAME_LABEL.to_string(),
            format!("wskowdev-invoker-00-1-guest-{function}"),
        );
        let summary = ContainerSummary {
            id: container_id.to_string(),
            image: "openwhisk/action-nodejs-v14".to_string(),
            labels,
            state: "running".to_string(),
            ..ContainerSummary::default()
        };
        self.lock_containers().insert(function.to_string(), summary);
    }

    pub fn remove_container(&self, function: &str) {
        self.lock_containers().remove(function);
    }

    /// Make every lookup fail.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make every quota write fail.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Quota writes recorded so far.
    pub fn writes(&self) -> Vec<(String, i64)> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Last quota written to a container.
    pub fn last_quota(&self, container_id: &str) -> Option<i64> {
        self.writes()
            .into_iter()
            .rev()
            .find(|(id, _)| id == container_id)
            .map(|(_, quota)| quota)
    }

    fn lock_containers(&self) -> std::sync::MutexGuard<'_, HashMap<String, ContainerSummary>> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn find_container(
        &self,
        function: &str,
        role: &str,
    ) -> Result<Option<ContainerSummary>, RuntimeError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable(
                "mock runtime configured to fail lookups".to_string(),
            ));
        }
        let found = self
            .lock_containers()
            .get(function)
            .filter(|c| c.label(CONTAINER_NAME_LABEL) == Some(role))
            .cloned();
        debug!(function, role, found = found.is_some(), "[MOCK] Container lookup");
        Ok(found)
    }

    async fn update_cpu_quota(&self, container_id: &str, quota: i64) -> Result<(), RuntimeError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable(
                "mock runtime configured to fail updates".to_string(),
            ));
        }
        info!(container_id, quota, "[MOCK] Updating CPU quota");
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((container_id.to_string(), quota));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abcdef0123456789", "abcdef0123")]
    #[case("abc", "abc")]
    #[case("aéééééééééééé", "aééééééééé")]
    #[case("", "")]
    fn test_short_id(#[case] id: &str, #[case] expected: &str) {
        let summary = ContainerSummary {
            id: id.to_string(),
            ..ContainerSummary::default()
        };
        assert_eq!(summary.short_id(), expected);
    }

    #[tokio::test]
    async fn test_mock_lookup_by_role() {
        let runtime = MockRuntime::new().with_container("resize", "abcdef0123456789");

        let found = runtime
            .find_container("resize", ROLE_USER_ACTION)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.short_id(), "abcdef0123");

        let sandbox = runtime.find_container("resize", ROLE_POD).await.unwrap();
        assert!(sandbox.is_none());

        let missing = runtime.find_container("other", ROLE_USER_ACTION).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_mock_records_writes() {
        let runtime = MockRuntime::new();
        runtime.update_cpu_quota("c1", 50_000).await.unwrap();
        runtime.update_cpu_quota("c2", 20_000).await.unwrap();
        runtime.update_cpu_quota("c1", -1).await.unwrap();

        assert_eq!(runtime.writes().len(), 3);
        assert_eq!(runtime.last_quota("c1"), Some(-1));
        assert_eq!(runtime.last_quota("c3"), None);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let runtime = MockRuntime::new().with_container("f", "c");
        runtime.fail_lookups(true);
        runtime.fail_updates(true);

        assert!(runtime.find_container("f", ROLE_USER_ACTION).await.is_err());
        assert!(runtime.update_cpu_quota("c", 1).await.is_err());
        assert!(runtime.writes().is_empty());
    }
}
