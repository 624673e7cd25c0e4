//! Error types for the coordinator and its RPC clients.

use thiserror::Error;

/// Errors from a watcher or coordinator RPC.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The peer could not be reached or the exchange failed mid-way.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The peer answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors returned by the coordinator to its callers.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The request or reset token is malformed.
    #[error(transparent)]
    Validation(#[from] seqclock_request::RequestError),

    /// The request ID is not live (never issued, or already released).
    #[error("request {0} not found")]
    NotFound(u64),

    /// No watcher node could take the request.
    #[error("unavailable: {0}")]
    Unavailable(String),
}
