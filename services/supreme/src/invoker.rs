//! Client used by pipeline-step invokers to talk to the coordinator.

use std::time::Duration;

use seqclock_request::{Metrics, Request, ResetRequest, SlackTracker};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::ClientError;

/// HTTP client for the coordinator.
#[derive(Debug, Clone)]
pub struct SupremeClient {
    client: reqwest::Client,
    base_url: String,
}

impl SupremeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Liveness probe.
    pub async fn check(&self) -> Result<String, ClientError> {
        let response = self.client.get(self.url("/check")).send().await?;
        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            Self::handle_error(response).await
        }
    }

    /// Ask for resources ahead of a step. The returned token releases them.
    pub async fn request_resources(
        &self,
        function: &str,
        metrics: Metrics,
    ) -> Result<ResetRequest, ClientError> {
        let request = Request::new(function, metrics);
        debug!(function = %function, slack = metrics.slack, "Requesting resources");
        self.post("/function/requestResources", &request).await
    }

    /// Release the grant behind `reset`.
    pub async fn reset_resources(&self, reset: &ResetRequest) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/function/resetResources"))
            .json(reset)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Self::handle_error(response).await
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Self::handle_error(response).await
        }
    }

    async fn handle_error<T>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        // Prefer the problem detail over the raw body.
        let body = serde_json::from_str::<ProblemBody>(&text)
            .map(|p| p.detail)
            .unwrap_or(text);
        Err(ClientError::Status { status, body })
    }
}

#[derive(Debug, Deserialize)]
struct ProblemBody {
    detail: String,
}

/// Drives the resource protocol for the steps of one pipeline run.
///
/// Wraps every step in a request/reset pair and keeps the slack figures up
/// to date between steps.
#[derive(Debug)]
pub struct PipelineRun {
    client: SupremeClient,
    tracker: SlackTracker,
}

impl PipelineRun {
    pub fn new(client: SupremeClient) -> Self {
        Self {
            client,
            tracker: SlackTracker::new(),
        }
    }

    /// Request resources for the next step, profiled at `profiled`.
    pub async fn begin_step(
        &self,
        function: &str,
        profiled: Duration,
    ) -> Result<ResetRequest, ClientError> {
        self.client
            .request_resources(function, self.tracker.metrics_for(profiled))
            .await
    }

    /// Record the finished step and release its grant.
    pub async fn end_step(
        &mut self,
        reset: &ResetRequest,
        profiled: Duration,
        elapsed: Duration,
    ) -> Result<(), ClientError> {
        self.tracker.record(profiled, elapsed);
        self.client.reset_resources(reset).await
    }

    pub fn tracker(&self) -> &SlackTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client =
            SupremeClient::new("http://supreme.local:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("/function/requestResources"),
            "http://supreme.local:8080/function/requestResources"
        );
    }
}
