//! Error types for request validation.

use thiserror::Error;

/// Errors raised when a request or reset token is malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The function name is empty.
    #[error("no function name was provided")]
    EmptyFunction,

    /// The reset token names a different function than the request it releases.
    #[error("reset for request {id} names function '{actual}', expected '{expected}'")]
    FunctionMismatch {
        id: u64,
        expected: String,
        actual: String,
    },
}

impl RequestError {
    /// Returns true if this error is caused by a missing function name.
    pub fn is_empty_function(&self) -> bool {
        matches!(self, RequestError::EmptyFunction)
    }
}
