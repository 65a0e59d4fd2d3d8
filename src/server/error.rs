//! HTTP error mapping for the relay endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::range::RangeError;

/// Boundary errors, each with a fixed status code and a plain-text body.
///
/// Consumer-side failures never touch the producer or other consumers, so
/// every variant here maps to a response on exactly one connection.
#[derive(Debug)]
pub enum ApiError {
    /// The consumer's range header cannot be satisfied.
    InvalidRange(RangeError),
    /// The path token does not match the configured access token.
    AuthDenied,
    /// No upload has been started yet.
    NoStream,
    /// A second producer tried to upload while one is active.
    AlreadyStreaming,
    /// The endpoint exists but not for this method.
    MethodNotAllowed,
    /// The stream could not be prepared from the upload body.
    StreamOpenFailed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            // The parser's message is the response body, verbatim.
            ApiError::InvalidRange(err) => {
                (StatusCode::RANGE_NOT_SATISFIABLE, err.to_string())
            }
            ApiError::AuthDenied => (StatusCode::UNAUTHORIZED, "Access denied".to_string()),
            ApiError::NoStream => (
                StatusCode::NOT_FOUND,
                "no stream has been uploaded yet".to_string(),
            ),
            ApiError::AlreadyStreaming => (
                StatusCode::BAD_REQUEST,
                "already receiving a stream; one upload per process".to_string(),
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed".to_string(),
            ),
            ApiError::StreamOpenFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not open stream for upload body".to_string(),
            ),
        };
        (status, body).into_response()
    }
}

impl From<RangeError> for ApiError {
    fn from(err: RangeError) -> Self {
        ApiError::InvalidRange(err)
    }
}
