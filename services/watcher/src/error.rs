//! Error types for the conflict resolver and the container runtime.

use thiserror::Error;

/// Errors returned to callers of the conflict resolver.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// No registry entry exists for the function.
    #[error("request for '{0}' function not found")]
    FunctionNotFound(String),

    /// The function is tracked but the request ID is neither primary nor pending.
    #[error("request {id} for '{function}' function not found")]
    RequestNotFound { id: u64, function: String },

    /// No container for the function runs on this node.
    #[error("no container for '{0}' function on this node")]
    ContainerNotFound(String),

    /// The request itself is malformed.
    #[error(transparent)]
    Validation(#[from] seqclock_request::RequestError),

    /// The container runtime could not be queried.
    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl ResolverError {
    /// Returns true for every flavour of "not here".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ResolverError::FunctionNotFound(_)
                | ResolverError::RequestNotFound { .. }
                | ResolverError::ContainerNotFound(_)
        )
    }
}

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pod name pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("runtime API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("container not found: {0}")]
    UnknownContainer(String),

    /// Failure injected by the mock runtime.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

impl From<hyper::http::Error> for RuntimeError {
    fn from(err: hyper::http::Error) -> Self {
        RuntimeError::Api {
            status: 0,
            message: err.to_string(),
        }
    }
}
