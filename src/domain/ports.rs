//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the abstractions the cache core depends on. Infrastructure
//! adapters implement these traits to provide concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Core                              │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │          Store          │        CacheRecorder       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  MemoryStore │ PrometheusRecorder │ InMemoryRecorder │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Fixed-width digest of a request's canonical bytes.
///
/// Rendered as 16 lowercase hex digits, most significant byte first. Two requests
/// share a hash exactly when their canonical bytes are identical (modulo XXH64
/// collisions, which are not guarded against).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Width of the hex rendering.
    pub const HEX_LEN: usize = 16;

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse the hex rendering produced by `Display`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != Self::HEX_LEN
            || !s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(Error::Internal(format!("malformed content hash: {s:?}")));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::Internal(format!("malformed content hash {s:?}: {e}")))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A member of an ordered set together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: u64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: u64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// A write queued inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    /// Create `key` with `value` unless it already exists.
    SetIfAbsent { key: String, value: Bytes },
    /// Add `delta` to `member`'s score in `set`, creating the member at `delta`.
    IncrementScore {
        set: String,
        member: String,
        delta: u64,
    },
}

impl TxOp {
    /// Key this operation writes to.
    pub fn key(&self) -> &str {
        match self {
            TxOp::SetIfAbsent { key, .. } => key,
            TxOp::IncrementScore { set, .. } => set,
        }
    }
}

/// Result of one queued operation after a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// `SetIfAbsent`: whether this commit created the key.
    Created(bool),
    /// `IncrementScore`: the member's score after the increment.
    Score(u64),
}

/// Outcome of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// All queued operations were applied, outcomes in queue order.
    Committed(Vec<OpOutcome>),
    /// A watched key changed after `begin`; nothing was applied.
    Conflict,
}

impl CommitResult {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CommitResult::Conflict)
    }
}

/// An optimistic transaction: watched key versions captured at `begin`, plus the
/// writes to apply at commit.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    watched: Vec<(String, u64)>,
    ops: Vec<TxOp>,
}

impl Transaction {
    /// Create a transaction over the given `(key, version)` snapshot. Called by stores.
    pub fn new(watched: Vec<(String, u64)>) -> Self {
        Self {
            watched,
            ops: Vec::new(),
        }
    }

    /// Queue a create-if-missing write.
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: Bytes) -> &mut Self {
        self.ops.push(TxOp::SetIfAbsent {
            key: key.into(),
            value,
        });
        self
    }

    /// Queue an ordered-set score increment.
    pub fn increment_score(
        &mut self,
        set: impl Into<String>,
        member: impl Into<String>,
        delta: u64,
    ) -> &mut Self {
        self.ops.push(TxOp::IncrementScore {
            set: set.into(),
            member: member.into(),
            delta,
        });
        self
    }

    pub fn watched(&self) -> &[(String, u64)] {
        &self.watched
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn into_parts(self) -> (Vec<(String, u64)>, Vec<TxOp>) {
        (self.watched, self.ops)
    }
}

// =============================================================================
// Store Port
// =============================================================================

/// Port for the key-value / ordered-set engine backing the cache.
///
/// All writes go through `begin` + `commit`. A commit fails with
/// [`CommitResult::Conflict`] when any watched key was written by another commit
/// after `begin` returned. Backend failures are reported as
/// [`Error::StoreUnavailable`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction watching `keys`.
    async fn begin(&self, keys: &[&str]) -> Result<Transaction>;

    /// Apply the queued writes atomically, or report a conflict.
    async fn commit(&self, tx: Transaction) -> Result<CommitResult>;

    /// Members of `set` between ranks `from` and `to` inclusive, ascending by score.
    ///
    /// Negative ranks count from the end: `-1` is the highest score.
    async fn range_by_rank(&self, set: &str, from: i64, to: i64) -> Result<Vec<ScoredMember>>;

    /// Read a plain key.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Check if the store is reachable.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Recorder Port
// =============================================================================

/// Store call kinds, used as a label for latency observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Begin,
    Commit,
    Range,
    Get,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Begin => "begin",
            StoreOp::Commit => "commit",
            StoreOp::Range => "range",
            StoreOp::Get => "get",
        }
    }
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port for cache instrumentation.
///
/// Injected into the repository so counters live with their owner instead of in
/// process-wide statics.
pub trait CacheRecorder: Send + Sync {
    /// A committed increment created the payload for `hash`.
    fn record_first_seen(&self, hash: &ContentHash);

    /// A committed increment found the payload for `hash` already stored.
    fn record_repeat(&self, hash: &ContentHash);

    /// A commit lost the optimistic race and will be retried.
    fn record_conflict(&self);

    /// A store call failed.
    fn record_store_error(&self);

    /// Latency of one store call.
    fn observe_store_latency(&self, op: StoreOp, elapsed: Duration);
}

// =============================================================================
// Tests
// =============================================================================
