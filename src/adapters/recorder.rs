//! Recorder Adapters
//!
//! Implements the `CacheRecorder` port without an external metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::domain::ports::{CacheRecorder, ContentHash, StoreOp};

/// Recorder that drops every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl CacheRecorder for NoopRecorder {
    fn record_first_seen(&self, _hash: &ContentHash) {}
    fn record_repeat(&self, _hash: &ContentHash) {}
    fn record_conflict(&self) {}
    fn record_store_error(&self) {}
    fn observe_store_latency(&self, _op: StoreOp, _elapsed: Duration) {}
}

/// Point-in-time copy of an [`InMemoryRecorder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderSnapshot {
    pub first_seen: u64,
    pub repeats: u64,
    pub conflicts: u64,
    pub store_errors: u64,
}

/// In-memory recorder for testing and debugging.
///
/// Keeps totals plus a per-hash observation count so tests can check which
/// increment created a payload.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    first_seen: AtomicU64,
    repeats: AtomicU64,
    conflicts: AtomicU64,
    store_errors: AtomicU64,
    observations: DashMap<ContentHash, u64>,
    latency_samples: DashMap<StoreOp, u64>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        RecorderSnapshot {
            first_seen: self.first_seen.load(Ordering::Relaxed),
            repeats: self.repeats.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }

    /// Committed increments observed for `hash`.
    pub fn observations(&self, hash: &ContentHash) -> u64 {
        self.observations.get(hash).map(|v| *v).unwrap_or(0)
    }

    /// Number of latency samples recorded for `op`.
    pub fn latency_samples(&self, op: StoreOp) -> u64 {
        self.latency_samples.get(&op).map(|v| *v).unwrap_or(0)
    }

    fn observe(&self, hash: &ContentHash) {
        *self.observations.entry(*hash).or_insert(0) += 1;
    }
}

impl CacheRecorder for InMemoryRecorder {
    fn record_first_seen(&self, hash: &ContentHash) {
        self.first_seen.fetch_add(1, Ordering::Relaxed);
        self.observe(hash);
    }

    fn record_repeat(&self, hash: &ContentHash) {
        self.repeats.fetch_add(1, Ordering::Relaxed);
        self.observe(hash);
    }

    fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_store_latency(&self, op: StoreOp, _elapsed: Duration) {
        *self.latency_samples.entry(op).or_insert(0) += 1;
    }
}
