//! HTTP error bodies and the mapping from ranking errors to status codes.

use hyper::StatusCode;
use serde::Serialize;

use crate::domain::FieldError;
use crate::error::Error;

/// JSON error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "errors", skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl ErrorResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            fields: Vec::new(),
        }
    }

    pub fn fields(fields: Vec<FieldError>) -> Self {
        Self {
            message: None,
            fields,
        }
    }
}

/// Status and body for a failed most-requested lookup.
///
/// "Nothing recorded" and "counter without payload" both answer 204: the
/// caller has no request to show either way. An undecodable payload is a 500.
pub fn ranking_error(err: &Error) -> (StatusCode, ErrorResponse) {
    match err {
        Error::NoCountersFound | Error::NoDataFound { .. } => (
            StatusCode::NO_CONTENT,
            ErrorResponse::message("No data was found for top metric"),
        ),
        Error::NoRequestFound { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::message("Data has been corrupted"),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::message("Sorry something went wrong"),
        ),
    }
}
