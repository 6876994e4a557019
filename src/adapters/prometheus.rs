//! Prometheus Recorder Adapter
//!
//! Implements the `CacheRecorder` port on an owned Prometheus registry. The
//! registry is shared with the HTTP layer, which adds its own collectors and
//! serves the text exposition.

use std::time::Duration;

use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};

use crate::domain::ports::{CacheRecorder, ContentHash, StoreOp};
use crate::error::Result;

/// Namespace prefixed to every exported metric.
pub const METRICS_NAMESPACE: &str = "reqrank";

/// Prometheus-backed recorder.
#[derive(Clone)]
pub struct PrometheusRecorder {
    registry: Registry,
    first_seen: IntCounter,
    repeats: IntCounter,
    conflicts: IntCounter,
    store_errors: IntCounter,
    store_latency: HistogramVec,
}

impl PrometheusRecorder {
    /// Create a recorder with a fresh registry.
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create a recorder registering its collectors into `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let counter = |name: &str, help: &str| -> Result<IntCounter> {
            let c = IntCounter::with_opts(
                Opts::new(name, help)
                    .namespace(METRICS_NAMESPACE)
                    .subsystem("cache"),
            )?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let first_seen = counter("first_seen_total", "requests stored for the first time")?;
        let repeats = counter("repeat_total", "requests already stored when counted")?;
        let conflicts = counter("tx_conflict_total", "optimistic transactions retried")?;
        let store_errors = counter("store_error_total", "count error during store call")?;

        let store_latency = HistogramVec::new(
            HistogramOpts::new("store_duration_seconds", "total duration of store call")
                .namespace(METRICS_NAMESPACE)
                .subsystem("cache")
                .buckets(exponential_buckets(0.001, 1.5, 15)?),
            &["op"],
        )?;
        registry.register(Box::new(store_latency.clone()))?;

        Ok(Self {
            registry,
            first_seen,
            repeats,
            conflicts,
            store_errors,
            store_latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode every registered metric in the text exposition format.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for PrometheusRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusRecorder")
            .field("first_seen", &self.first_seen.get())
            .field("repeats", &self.repeats.get())
            .field("conflicts", &self.conflicts.get())
            .finish()
    }
}

impl CacheRecorder for PrometheusRecorder {
    fn record_first_seen(&self, _hash: &ContentHash) {
        self.first_seen.inc();
    }

    fn record_repeat(&self, _hash: &ContentHash) {
        self.repeats.inc();
    }

    fn record_conflict(&self) {
        self.conflicts.inc();
    }

    fn record_store_error(&self) {
        self.store_errors.inc();
    }

    fn observe_store_latency(&self, op: StoreOp, elapsed: Duration) {
        self.store_latency
            .with_label_values(&[op.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let recorder = PrometheusRecorder::new().unwrap();
        let hash = ContentHash::from_u64(7);

        recorder.record_first_seen(&hash);
        recorder.record_repeat(&hash);
        recorder.record_repeat(&hash);
        recorder.record_conflict();
        recorder.observe_store_latency(StoreOp::Commit, Duration::from_millis(2));

        let (content_type, body) = recorder.encode().unwrap();
        let text = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("reqrank_cache_first_seen_total 1"));
        assert!(text.contains("reqrank_cache_repeat_total 2"));
        assert!(text.contains("reqrank_cache_tx_conflict_total 1"));
        assert!(text.contains("reqrank_cache_store_duration_seconds_count{op=\"commit\"} 1"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        PrometheusRecorder::with_registry(registry.clone()).unwrap();
        assert!(PrometheusRecorder::with_registry(registry).is_err());
    }
}
