//! HTTP Surface
//!
//! Minimal HTTP/1 server exposing the FizzBuzz computation and the ranking
//! cache.
//!
//! # Routes
//!
//! | Method | Path                  | Response                                  |
//! |--------|-----------------------|-------------------------------------------|
//! | GET    | `/`                   | version and component name                |
//! | POST   | `/fizzbuzz`           | computed list; the request is counted     |
//! | GET    | `/metrics`            | most requested request and its counter    |
//! | GET    | `/prometheus-metrics` | Prometheus text exposition                |
//! | GET    | `/healthz`, `/livez`  | liveness                                  |
//! | GET    | `/readyz`             | store reachability                        |

mod errors;
mod handlers;
pub mod health;
mod metrics;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use errors::{ranking_error, ErrorResponse};
pub use handlers::{HttpResponse, MAX_BODY_BYTES};
pub use health::{Readiness, StoreCheck};
pub use metrics::{HttpMetrics, RequestTimer, CLIENT_CLOSED_REQUEST};

use crate::cache::{CounterRepository, RankingQuery};
use crate::error::{Error, Result};

/// Shared state handed to every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub(crate) repo: Arc<CounterRepository>,
    pub(crate) ranking: RankingQuery,
    pub(crate) registry: Registry,
    pub(crate) http_metrics: HttpMetrics,
}

impl AppState {
    /// Build the state, registering the HTTP collectors into `registry`.
    pub fn new(
        repo: Arc<CounterRepository>,
        ranking: RankingQuery,
        registry: Registry,
    ) -> Result<Self> {
        let http_metrics = HttpMetrics::register(&registry)?;
        Ok(Self {
            repo,
            ranking,
            registry,
            http_metrics,
        })
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }
}

/// Known endpoints, plus the two fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Index,
    FizzBuzz,
    MostRequested,
    Prometheus,
    Live,
    Ready,
    MethodNotAllowed,
    NotFound,
}

impl Route {
    fn resolve(method: &Method, path: &str) -> Self {
        match (method, path) {
            (&Method::GET, "/") => Route::Index,
            (&Method::POST, "/fizzbuzz") => Route::FizzBuzz,
            (&Method::GET, "/metrics") => Route::MostRequested,
            (&Method::GET, "/prometheus-metrics") => Route::Prometheus,
            (&Method::GET, "/healthz" | "/livez") => Route::Live,
            (&Method::GET, "/readyz") => Route::Ready,
            (
                _,
                "/" | "/fizzbuzz" | "/metrics" | "/prometheus-metrics" | "/healthz" | "/livez"
                | "/readyz",
            ) => Route::MethodNotAllowed,
            _ => Route::NotFound,
        }
    }

    /// Handler label for metrics.
    fn name(self) -> &'static str {
        match self {
            Route::Index => "/",
            Route::FizzBuzz => "/fizzbuzz",
            Route::MostRequested => "/metrics",
            Route::Prometheus => "/prometheus-metrics",
            Route::Live => "/healthz",
            Route::Ready => "/readyz",
            Route::MethodNotAllowed => "method_not_allowed",
            Route::NotFound => "not_found",
        }
    }
}

/// Route one request.
pub async fn handle<B>(state: &AppState, req: Request<B>) -> HttpResponse
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = normalize_path(req.uri().path()).into_owned();
    let route = Route::resolve(&method, &path);
    let timer = state.http_metrics.start(route.name(), method.as_str());

    let response = match route {
        Route::Index => handlers::index(),
        Route::FizzBuzz => handlers::fizzbuzz(state, req).await,
        Route::MostRequested => handlers::most_requested(state).await,
        Route::Prometheus => handlers::prometheus_metrics(state),
        Route::Live => handlers::text(StatusCode::OK, "ok"),
        Route::Ready => handlers::readiness(state).await,
        Route::MethodNotAllowed => {
            handlers::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        Route::NotFound => handlers::text(StatusCode::NOT_FOUND, "not found"),
    };

    let status = response.status().as_u16();
    let elapsed = timer.finish(status);
    info!(
        target: "access",
        method = %method,
        path = %path,
        status,
        latency_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        "request"
    );

    response
}

/// Collapse repeated slashes and drop a trailing one.
fn normalize_path(path: &str) -> std::borrow::Cow<'_, str> {
    if !path.contains("//") && (path == "/" || !path.ends_with('/')) {
        return std::borrow::Cow::Borrowed(path);
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    std::borrow::Cow::Owned(format!("/{}", segments.join("/")))
}

/// Bind `addr`.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address {addr}: {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind server on {addr}: {e}")))
}

/// Accept connections until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Server listening on {}", addr);
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("Server accept error: {e}")))?,
        };

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle(&state, req).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(peer = %peer, "Server connection error: {}", e);
            } else {
                debug!(peer = %peer, "Connection closed");
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, NoopRecorder};
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    fn state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let repo = Arc::new(CounterRepository::new(store.clone(), Arc::new(NoopRecorder)));
        let ranking = RankingQuery::new(repo.clone());
        let state = AppState::new(repo, ranking, Registry::new()).unwrap();
        (store, state)
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const VALID: &str = r#"{"fst_mod":3,"snd_mod":5,"limit":15,"fst_str":"fizz","snd_str":"buzz"}"#;

    #[tokio::test]
    async fn test_fizzbuzz_ok_and_counted() {
        let (_, state) = state();
        let response = handle(&state, request(Method::POST, "/fizzbuzz", VALID)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 15);
        assert_eq!(body[14], "fizzbuzz");

        let top = handle(&state, request(Method::GET, "/metrics", "")).await;
        assert_eq!(top.status(), StatusCode::OK);
        let top = body_json(top).await;
        assert_eq!(top["counter"], 1);
        assert_eq!(top["request"]["fst_str"], "fizz");
    }

    #[tokio::test]
    async fn test_fizzbuzz_validation_errors() {
        let (_, state) = state();
        let response = handle(
            &state,
            request(Method::POST, "/fizzbuzz", r#"{"fst_mod":3,"snd_mod":5}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field_name"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["limit", "fst_str", "snd_str"]);
    }

    #[tokio::test]
    async fn test_fizzbuzz_malformed_json() {
        let (_, state) = state();
        let response = handle(&state, request(Method::POST, "/fizzbuzz", "{nope")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["message"]
            .as_str()
            .unwrap()
            .starts_with("Malformed JSON"));
    }

    #[tokio::test]
    async fn test_fizzbuzz_survives_store_outage() {
        let (store, state) = state();
        store.set_unavailable(true);
        let response = handle(&state, request(Method::POST, "/fizzbuzz", VALID)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_empty_is_no_content() {
        let (_, state) = state();
        let response = handle(&state, request(Method::GET, "/metrics", "")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_readiness_follows_store() {
        let (store, state) = state();
        let ok = handle(&state, request(Method::GET, "/readyz", "")).await;
        assert_eq!(ok.status(), StatusCode::OK);

        store.set_unavailable(true);
        let down = handle(&state, request(Method::GET, "/readyz", "")).await;
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(down).await;
        assert_eq!(body["ready"], false);
        assert!(body["store"]["error"].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_routing_fallbacks() {
        let (_, state) = state();
        let missing = handle(&state, request(Method::GET, "/nope", "")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let wrong = handle(&state, request(Method::GET, "/fizzbuzz", "")).await;
        assert_eq!(wrong.status(), StatusCode::METHOD_NOT_ALLOWED);

        let live = handle(&state, request(Method::GET, "/livez", "")).await;
        assert_eq!(live.status(), StatusCode::OK);

        let index = body_json(handle(&state, request(Method::GET, "/", "")).await).await;
        assert_eq!(index["version"], crate::VERSION);
        assert_eq!(state.http_metrics().inflight(), 0);
    }

    #[tokio::test]
    async fn test_prometheus_exposition() {
        let (_, state) = state();
        handle(&state, request(Method::GET, "/", "")).await;

        let response = handle(&state, request(Method::GET, "/prometheus-metrics", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("reqrank_http_total_duration_seconds"));
    }

    /// Body that never yields a frame.
    struct StalledBody;

    impl Body for StalledBody {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<std::result::Result<hyper::body::Frame<Bytes>, Infallible>>>
        {
            std::task::Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_inflight() {
        let (_, state) = state();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/fizzbuzz")
            .body(StalledBody)
            .unwrap();

        let outcome =
            tokio::time::timeout(std::time::Duration::from_millis(20), handle(&state, req)).await;
        assert!(outcome.is_err());
        assert_eq!(state.http_metrics().inflight(), 0);

        let response = handle(&state, request(Method::GET, "/prometheus-metrics", "")).await;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("code=\"499\""));
        assert!(text.contains("handler=\"/fizzbuzz\""));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/metrics"), "/metrics");
        assert_eq!(normalize_path("/metrics/"), "/metrics");
        assert_eq!(normalize_path("//fizzbuzz"), "/fizzbuzz");
        assert_eq!(normalize_path("///"), "/");
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (_, state) = state();
        let listener = bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(serve(listener, Arc::new(state), shutdown.clone()));
        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        assert!(matches!(bind("not-an-address").await, Err(Error::Config(_))));
    }
}
