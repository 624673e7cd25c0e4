//! Docker Engine API client over the daemon's unix socket.
//!
//! Reference: https://docs.docker.com/engine/api/v1.41/

use std::path::Path;

use async_trait::async_trait;
use hyper::{body::Buf, Body, Client, Method, Request};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error};

use super::{ContainerRuntime, ContainerSummary, CONTAINER_NAME_LABEL, POD_NAME_LABEL};
use crate::error::RuntimeError;

/// Default location of the Docker daemon socket.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Pod name prefix OpenWhisk's Kubernetes invoker gives action pods.
const POD_NAME_PREFIX: &str = "^wskowdev-invoker-[0-9]*-[0-9]*-guest-";

/// Body of `POST /containers/{id}/update`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateConfig {
    cpu_quota: i64,
}

/// Docker runtime bound to one daemon socket.
pub struct DockerRuntime {
    socket_path: String,
    client: Client<UnixConnector>,
}

impl DockerRuntime {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        let socket_path = socket_path.as_ref().to_string_lossy().to_string();
        Self {
            socket_path,
            client: Client::unix(),
        }
    }

    /// Check if the socket exists.
    pub fn socket_exists(&self) -> bool {
        Path::new(&self.socket_path).exists()
    }

    /// List running containers.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let uri = Uri::new(&self.socket_path, "/containers/json");
        debug!("GET /containers/json");

        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("Accept", "application/json")
            .body(Body::empty())?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let body = hyper::body::aggregate(response.into_body()).await?;

        if status.is_success() {
            Ok(serde_json::from_reader(body.reader())?)
        } else {
            let message = String::from_utf8_lossy(body.chunk()).to_string();
            error!(status = %status, message = %message, "Docker API error");
            Err(RuntimeError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), RuntimeError> {
        let body_bytes = serde_json::to_vec(body)?;
        let uri = Uri::new(&self.socket_path, path);

        debug!(path = path, "POST request to Docker API");

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(Body::from(body_bytes))?;

        let response = self.client.request(request).await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 404 {
            Err(RuntimeError::UnknownContainer(path.to_string()))
        } else {
            let body = hyper::body::aggregate(response.into_body()).await?;
            let message = String::from_utf8_lossy(body.chunk()).to_string();
            error!(status = %status, message = %message, "Docker API error");
            Err(RuntimeError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Pattern matching the pod names of `function`'s action pods.
pub(crate) fn pod_name_pattern(function: &str) -> Result<Regex, RuntimeError> {
    Ok(Regex::new(&format!(
        "{POD_NAME_PREFIX}{}",
        regex::escape(function)
    ))?)
}

/// First container with the given role whose pod name matches `pattern`.
pub(crate) fn select_container(
    containers: Vec<ContainerSummary>,
    role: &str,
    pattern: &Regex,
) -> Option<ContainerSummary> {
    containers.into_iter().find(|c| {
        c.label(CONTAINER_NAME_LABEL) == Some(role)
            && c.label(POD_NAME_LABEL)
                .is_some_and(|pod| pattern.is_match(pod))
    })
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find_container(
        &self,
        function: &str,
        role: &str,
    ) -> Result<Option<ContainerSummary>, RuntimeError> {
        let pattern = pod_name_pattern(function)?;
        let containers = self.list_containers().await?;
        Ok(select_container(containers, role, &pattern))
    }

    async fn update_cpu_quota(&self, container_id: &str, quota: i64) -> Result<(), RuntimeError> {
        let path = format!("/containers/{container_id}/update");
        self.post(&path, &UpdateConfig { cpu_quota: quota }).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::runtime::{ROLE_POD, ROLE_USER_ACTION};

    fn container(id: &str, role: &str, pod: &str) -> ContainerSummary {
        let mut labels = HashMap::new();
        labels.insert(CONTAINER_NAME_LABEL.to_string(), role.to_string());
        labels.insert(POD_NAME_LABEL.to_string(), pod.to_string());
        ContainerSummary {
            id: id.to_string(),
            labels,
            ..ContainerSummary::default()
        }
    }

    #[test]
    fn test_select_matches_role_and_pod() {
        let pattern = pod_name_pattern("resize").unwrap();
        let containers = vec![
            container("sandbox", ROLE_POD, "wskowdev-invoker-00-12-guest-resize"),
            container("other", ROLE_USER_ACTION, "wskowdev-invoker-00-13-guest-thumb"),
            container("action", ROLE_USER_ACTION, "wskowdev-invoker-00-12-guest-resize"),
        ];

        let found = select_container(containers.clone(), ROLE_USER_ACTION, &pattern).unwrap();
        assert_eq!(found.id, "action");

        let found = select_container(containers, ROLE_POD, &pattern).unwrap();
        assert_eq!(found.id, "sandbox");
    }

    #[test]
    fn test_select_ignores_unlabelled_containers() {
        let pattern = pod_name_pattern("resize").unwrap();
        let containers = vec![ContainerSummary {
            id: "bare".to_string(),
            ..ContainerSummary::default()
        }];
        assert!(select_container(containers, ROLE_USER_ACTION, &pattern).is_none());
    }

    #[test]
    fn test_pattern_escapes_function_name() {
        let pattern = pod_name_pattern("a.b").unwrap();
        assert!(pattern.is_match("wskowdev-invoker-00-1-guest-a.b"));
        assert!(!pattern.is_match("wskowdev-invoker-00-1-guest-axb"));
    }

    #[test]
    fn test_update_config_wire_format() {
        let body = serde_json::to_value(UpdateConfig { cpu_quota: -1 }).unwrap();
        assert_eq!(body, serde_json::json!({ "CpuQuota": -1 }));
    }

    #[test]
    fn test_container_list_decodes() {
        let raw = serde_json::json!([{
            "Id": "8dfafdbc3a40",
            "Names": ["/k8s_user-action_wskowdev-invoker-00-1-guest-resize"],
            "Image": "openwhisk/action-nodejs-v14",
            "Command": "/bin/sh -c 'node app.js'",
            "Created": 1367854155,
            "Labels": { "io.kubernetes.container.name": "user-action" },
            "State": "running",
            "Status": "Up 2 minutes",
            "Ports": []
        }]);
        let containers: Vec<ContainerSummary> = serde_json::from_value(raw).unwrap();
        assert_eq!(containers[0].id, "8dfafdbc3a40");
        assert_eq!(containers[0].state, "running");
    }
}
