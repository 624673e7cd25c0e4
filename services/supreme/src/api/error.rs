use axum::{
    extract::rejection::JsonRejection,
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::CoordinatorError;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://seqclock.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match &err {
            CoordinatorError::Validation(_) => ApiError::bad_request("invalid_request", err.to_string()),
            CoordinatorError::NotFound(_) => {
                ApiError::not_found("request_not_found", err.to_string())
            }
            CoordinatorError::Unavailable(_) => {
                ApiError::service_unavailable("unavailable", err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("invalid_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use seqclock_request::RequestError;

    #[rstest]
    #[case(CoordinatorError::Validation(RequestError::EmptyFunction), StatusCode::BAD_REQUEST)]
    #[case(CoordinatorError::NotFound(7), StatusCode::NOT_FOUND)]
    #[case(
        CoordinatorError::Unavailable("no node".to_string()),
        StatusCode::SERVICE_UNAVAILABLE
    )]
    fn test_coordinator_errors_map_to_status(
        #[case] err: CoordinatorError,
        #[case] expected: StatusCode,
    ) {
        let api: ApiError = err.into();
        assert_eq!(api.status, expected);
        assert_eq!(api.problem.status, expected.as_u16());
        assert_eq!(
            api.problem.title,
            expected.canonical_reason().unwrap_or("Unknown Error")
        );
    }
}
