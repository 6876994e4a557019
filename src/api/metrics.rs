//! HTTP request instrumentation.

use std::time::{Duration, Instant};

use prometheus::{exponential_buckets, HistogramOpts, HistogramVec, IntGauge, Opts, Registry};

use crate::adapters::METRICS_NAMESPACE;
use crate::error::Result;

/// Status recorded for requests dropped before a response was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// In-flight gauge and per-route duration histogram.
#[derive(Clone)]
pub struct HttpMetrics {
    inflight: IntGauge,
    durations: HistogramVec,
}

impl HttpMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let inflight = IntGauge::with_opts(
            Opts::new("inflight", "numbers of http call in progress")
                .namespace(METRICS_NAMESPACE)
                .subsystem("http"),
        )?;
        registry.register(Box::new(inflight.clone()))?;

        let durations = HistogramVec::new(
            HistogramOpts::new("total_duration_seconds", "total duration of the handler")
                .namespace(METRICS_NAMESPACE)
                .subsystem("http")
                .buckets(exponential_buckets(0.001, 1.5, 15)?),
            &["handler", "method", "code"],
        )?;
        registry.register(Box::new(durations.clone()))?;

        Ok(Self {
            inflight,
            durations,
        })
    }

    /// Count a request as in flight until the returned timer is dropped.
    pub fn start(&self, handler: &'static str, method: &str) -> RequestTimer {
        self.inflight.inc();
        RequestTimer {
            metrics: self.clone(),
            handler,
            method: method.to_string(),
            start: Instant::now(),
            code: None,
        }
    }

    pub fn inflight(&self) -> i64 {
        self.inflight.get()
    }
}

impl std::fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetrics")
            .field("inflight", &self.inflight.get())
            .finish()
    }
}

/// One in-flight request.
///
/// Dropping it releases the gauge and records the duration. A timer dropped
/// without [`RequestTimer::finish`] is recorded as [`CLIENT_CLOSED_REQUEST`].
#[derive(Debug)]
pub struct RequestTimer {
    metrics: HttpMetrics,
    handler: &'static str,
    method: String,
    start: Instant,
    code: Option<u16>,
}

impl RequestTimer {
    /// Record the response status and return the elapsed time.
    pub fn finish(mut self, code: u16) -> Duration {
        self.code = Some(code);
        self.start.elapsed()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.metrics.inflight.dec();
        let code = self.code.unwrap_or(CLIENT_CLOSED_REQUEST).to_string();
        self.metrics
            .durations
            .with_label_values(&[self.handler, self.method.as_str(), code.as_str()])
            .observe(self.start.elapsed().as_secs_f64());
    }
}
