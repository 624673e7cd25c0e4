//! Request and reset message types.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Slack measurements attached to every resource request.
///
/// All values are signed nanoseconds. Positive slack means the pipeline is
/// ahead of its profiled schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Slack observed after the most recent step (proportional term).
    pub slack: i64,

    /// Running sum of slack over the pipeline run (integral term).
    pub sum_of_slack: i64,

    /// Slack observed one step earlier (derivative term).
    pub previous_slack: i64,

    /// Profiled duration of the step about to run.
    pub profiled_execution_time: i64,
}

/// A demand for CPU quota on behalf of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Assigned by the coordinator. Callers leave it unset.
    #[serde(default)]
    pub id: u64,

    /// Name of the serverless function about to be invoked.
    pub function: String,

    pub metrics: Metrics,
}

impl Request {
    /// Create a request for `function` with the given metrics.
    pub fn new(function: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            id: 0,
            function: function.into(),
            metrics,
        }
    }

    /// Check the request is well formed.
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_function(&self.function)
    }
}

/// Capability token releasing the grant made for a prior [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResetRequest {
    pub id: u64,
    pub function: String,
}

impl ResetRequest {
    pub fn new(id: u64, function: impl Into<String>) -> Self {
        Self {
            id,
            function: function.into(),
        }
    }

    /// Derive the reset token for a request that already carries its ID.
    pub fn for_request(request: &Request) -> Self {
        Self::new(request.id, request.function.clone())
    }

    /// Check the token is well formed.
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_function(&self.function)
    }
}

fn validate_function(function: &str) -> Result<(), RequestError> {
    if function.trim().is_empty() {
        return Err(RequestError::EmptyFunction);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_use_camel_case_fields() {
        let metrics = Metrics {
            slack: 1,
            sum_of_slack: 2,
            previous_slack: 3,
            profiled_execution_time: 4,
        };
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["slack"], 1);
        assert_eq!(json["sumOfSlack"], 2);
        assert_eq!(json["previousSlack"], 3);
        assert_eq!(json["profiledExecutionTime"], 4);
    }

    #[test]
    fn test_request_id_defaults_to_zero() {
        let request: Request = serde_json::from_value(serde_json::json!({
            "function": "resize",
            "metrics": {
                "slack": 0,
                "sumOfSlack": 0,
                "previousSlack": 0,
                "profiledExecutionTime": 0
            }
        }))
        .unwrap();
        assert_eq!(request.id, 0);
        assert_eq!(request.function, "resize");
    }

    #[test]
    fn test_request_without_metrics_is_rejected() {
        let result: Result<Request, _> =
            serde_json::from_value(serde_json::json!({ "function": "resize" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_function_is_invalid() {
        let request = Request::new("  ", Metrics::default());
        assert_eq!(request.validate(), Err(RequestError::EmptyFunction));

        let reset = ResetRequest::new(3, "");
        assert!(reset.validate().unwrap_err().is_empty_function());
    }

    #[test]
    fn test_reset_for_request_copies_identity() {
        let mut request = Request::new("thumbnail", Metrics::default());
        request.id = 42;
        let reset = ResetRequest::for_request(&request);
        assert_eq!(reset, ResetRequest::new(42, "thumbnail"));
    }
}
