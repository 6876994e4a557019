//! Route handlers.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use super::errors::{ranking_error, ErrorResponse};
use super::health::{check_store, Readiness};
use super::AppState;
use crate::domain::{FizzBuzzRequest, RawFizzBuzzRequest};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub type HttpResponse = Response<Full<Bytes>>;

pub(crate) fn text(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

pub(crate) fn json<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            text(StatusCode::INTERNAL_SERVER_ERROR, "encoding error")
        }
    }
}

fn empty(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// `GET /`
pub fn index() -> HttpResponse {
    let component = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    json(
        StatusCode::OK,
        &json!({ "version": crate::VERSION, "component": component }),
    )
}

/// `POST /fizzbuzz`
///
/// Counting the request is a side effect: a failure is logged and the
/// computation is still returned.
pub async fn fizzbuzz<B>(state: &AppState, req: Request<B>) -> HttpResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(error = %e, "Rejected request body");
            return json(
                StatusCode::BAD_REQUEST,
                &ErrorResponse::message("Invalid request body"),
            );
        }
    };

    let raw: RawFizzBuzzRequest = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            return json(
                StatusCode::BAD_REQUEST,
                &ErrorResponse::message(format!("Malformed JSON: {e}")),
            );
        }
    };

    let request: FizzBuzzRequest = match raw.validate() {
        Ok(request) => request,
        Err(fields) => return json(StatusCode::BAD_REQUEST, &ErrorResponse::fields(fields)),
    };

    if let Err(e) = state.repo.increment_request(&request).await {
        error!(error = %e, "while incrementing request");
    }

    json(StatusCode::OK, &request.compute())
}

/// `GET /metrics`: the most requested FizzBuzz request.
pub async fn most_requested(state: &AppState) -> HttpResponse {
    match state.ranking.most_requested::<FizzBuzzRequest>().await {
        Ok(top) => json(StatusCode::OK, &top),
        Err(e) => {
            let (status, body) = ranking_error(&e);
            if status == StatusCode::NO_CONTENT {
                empty(status)
            } else {
                json(status, &body)
            }
        }
    }
}

/// `GET /prometheus-metrics`
pub fn prometheus_metrics(state: &AppState) -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return text(StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(value) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// `GET /readyz`
pub async fn readiness(state: &AppState) -> HttpResponse {
    let readiness = Readiness::from(check_store(state.repo.store().as_ref()).await);
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json(status, &readiness)
}
