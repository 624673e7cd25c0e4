//! Watcher-node RPC client.
//!
//! Wraps the two calls the coordinator makes to a node's watcher. The result
//! is tri-state:
//! - `Ok(true)`: the watcher granted (or released) the request
//! - `Ok(false)`: the function's container is not on that node
//! - `Err(_)`: transport or protocol failure
//!
//! No retries happen here.

use std::time::Duration;

use async_trait::async_trait;
use seqclock_request::{Request, ResetRequest};
use serde::Serialize;
use tracing::debug;

use crate::error::ClientError;

/// A cluster node running a watcher.
#[async_trait]
pub trait WatcherNode: Send + Sync {
    /// Name used in logs and catalog dumps.
    fn name(&self) -> &str;

    /// Ask the node to admit a resource request.
    async fn send_request(&self, request: &Request) -> Result<bool, ClientError>;

    /// Ask the node to release a grant.
    async fn send_reset(&self, reset: &ResetRequest) -> Result<bool, ClientError>;
}

/// HTTP client for one watcher node.
pub struct WatcherClient {
    node: String,
    base_url: String,
    client: reqwest::Client,
}

impl WatcherClient {
    /// Create a client for `node`, given as `host` or `host:port`.
    ///
    /// A bare host is reached on `default_port`.
    pub fn new(node: &str, default_port: u16, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            node: node.to_string(),
            base_url: base_url(node, default_port),
            client,
        })
    }

    async fn execute<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<bool, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, node = %self.node, "Calling watcher");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl WatcherNode for WatcherClient {
    fn name(&self) -> &str {
        &self.node
    }

    async fn send_request(&self, request: &Request) -> Result<bool, ClientError> {
        self.execute("/function/requestResources", request).await
    }

    async fn send_reset(&self, reset: &ResetRequest) -> Result<bool, ClientError> {
        self.execute("/function/resetRequest", reset).await
    }
}

fn base_url(node: &str, default_port: u16) -> String {
    if node.starts_with("http://") || node.starts_with("https://") {
        node.trim_end_matches('/').to_string()
    } else if node.contains(':') {
        format!("http://{node}")
    } else {
        format!("http://{node}:{default_port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("192.168.1.244", "http://192.168.1.244:8080")]
    #[case("10.0.0.5:9000", "http://10.0.0.5:9000")]
    #[case("http://watcher-0.local/", "http://watcher-0.local")]
    fn test_base_url(#[case] node: &str, #[case] expected: &str) {
        assert_eq!(base_url(node, 8080), expected);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            WatcherClient::new(&dead_addr.to_string(), 8080, Duration::from_millis(200)).unwrap();
        let result = client
            .send_request(&Request::new("f", Default::default()))
            .await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
}
