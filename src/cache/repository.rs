//! Counter Repository
//!
//! Stores each distinct request payload once and counts every occurrence.
//!
//! # Transaction
//!
//! ```text
//! begin(watch "counters")
//!   ├── SETNX data:<hash> <payload>
//!   └── ZINCRBY counters 1 <hash>
//! commit ──▶ Committed ──▶ done
//!        └─▶ Conflict  ──▶ retry (bounded by max_retries)
//! ```
//!
//! Every increment watches the shared `counters` key, so all increments, for
//! any hash, serialize through one optimistic retry domain. A commit by anyone
//! forces every other in-flight increment to retry.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, trace};

use super::hasher::{canonicalize, content_hash};
use crate::domain::ports::{
    CacheRecorder, CommitResult, ContentHash, OpOutcome, Store, StoreOp,
};
use crate::error::{Error, Result};

/// Ordered set holding one member per hash, scored by occurrence count.
pub const COUNTERS_KEY: &str = "counters";

/// Default optimistic retry budget per increment.
pub const DEFAULT_MAX_RETRIES: usize = 1000;

/// Key of the payload stored for `hash`.
pub fn data_key(hash: &ContentHash) -> String {
    format!("data:{hash}")
}

/// Repository configuration
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Commit attempts before giving up with `TransactionConflictExceeded`
    pub max_retries: usize,
    /// Optional wall-clock bound on a whole increment, retries included
    pub increment_timeout: Option<Duration>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            increment_timeout: None,
        }
    }
}

impl RepositoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".into()));
        }
        if self.increment_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("increment_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Result of a committed increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    pub hash: ContentHash,
    /// Whether this increment stored the payload.
    pub created: bool,
    /// Score right after this increment committed.
    pub score: u64,
    /// Commit attempts used, including the successful one.
    pub attempts: usize,
}

/// One (hash, count) pair of a ranking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterScore {
    pub hash: ContentHash,
    pub score: u64,
}

/// Rank window over the counters, ascending by score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingView {
    entries: Vec<CounterScore>,
}

impl RankingView {
    pub fn new(entries: Vec<CounterScore>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CounterScore] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hashes(&self) -> Vec<ContentHash> {
        self.entries.iter().map(|e| e.hash).collect()
    }

    pub fn scores(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.score).collect()
    }

    /// Highest-scored entry of the window.
    pub fn highest(&self) -> Option<&CounterScore> {
        self.entries.last()
    }
}

impl IntoIterator for RankingView {
    type Item = CounterScore;
    type IntoIter = std::vec::IntoIter<CounterScore>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Deduplicating counter over a [`Store`].
pub struct CounterRepository {
    store: Arc<dyn Store>,
    recorder: Arc<dyn CacheRecorder>,
    config: RepositoryConfig,
}

impl CounterRepository {
    /// Create a repository with the default configuration
    pub fn new(store: Arc<dyn Store>, recorder: Arc<dyn CacheRecorder>) -> Self {
        Self::with_config(store, recorder, RepositoryConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn Store>,
        recorder: Arc<dyn CacheRecorder>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            store,
            recorder,
            config,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Count one occurrence of `request`, storing its payload on first sight.
    pub async fn increment_request<R>(&self, request: &R) -> Result<IncrementOutcome>
    where
        R: Serialize + Sync + ?Sized,
    {
        let payload = canonicalize(request)?;
        let hash = content_hash(&payload);

        match self.config.increment_timeout {
            Some(limit) => tokio::time::timeout(limit, self.increment_payload(hash, payload))
                .await
                .map_err(|_| Error::Timeout {
                    operation: "increment".into(),
                    duration: limit,
                })?,
            None => self.increment_payload(hash, payload).await,
        }
    }

    async fn increment_payload(&self, hash: ContentHash, payload: Bytes) -> Result<IncrementOutcome> {
        let key = data_key(&hash);
        let member = hash.to_string();

        for attempt in 1..=self.config.max_retries {
            let mut tx = self
                .timed(StoreOp::Begin, self.store.begin(&[COUNTERS_KEY]))
                .await?;
            tx.set_if_absent(key.as_str(), payload.clone())
                .increment_score(COUNTERS_KEY, member.as_str(), 1);

            match self.timed(StoreOp::Commit, self.store.commit(tx)).await? {
                CommitResult::Committed(outcomes) => {
                    let (created, score) = match outcomes.as_slice() {
                        [OpOutcome::Created(created), OpOutcome::Score(score)] => {
                            (*created, *score)
                        }
                        other => {
                            self.recorder.record_store_error();
                            return Err(Error::StoreUnavailable(format!(
                                "unexpected commit outcome: {other:?}"
                            )));
                        }
                    };

                    if created {
                        self.recorder.record_first_seen(&hash);
                    } else {
                        self.recorder.record_repeat(&hash);
                    }
                    debug!(hash = %hash, created, score, attempts = attempt, "Request counted");

                    return Ok(IncrementOutcome {
                        hash,
                        created,
                        score,
                        attempts: attempt,
                    });
                }
                CommitResult::Conflict => {
                    self.recorder.record_conflict();
                    trace!(hash = %hash, attempt, "Optimistic lock lost, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }

        error!(
            key = COUNTERS_KEY,
            attempts = self.config.max_retries,
            "Transaction failed after reaching max retry"
        );
        Err(Error::TransactionConflictExceeded {
            key: COUNTERS_KEY.to_string(),
            attempts: self.config.max_retries,
        })
    }

    /// Counters between ranks `from` and `to` inclusive, ascending by score.
    pub async fn get_counters(&self, from: i64, to: i64) -> Result<RankingView> {
        let members = self
            .timed(
                StoreOp::Range,
                self.store.range_by_rank(COUNTERS_KEY, from, to),
            )
            .await?;

        let entries = members
            .into_iter()
            .map(|m| {
                Ok(CounterScore {
                    hash: ContentHash::parse(&m.member)?,
                    score: m.score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RankingView::new(entries))
    }

    /// Stored payload for `hash`.
    pub async fn get_data(&self, hash: &ContentHash) -> Result<Bytes> {
        let key = data_key(hash);
        self.timed(StoreOp::Get, self.store.get(&key))
            .await?
            .ok_or(Error::CacheKeyNotFound(key))
    }

    /// Run a store call, recording its latency and normalising failures to
    /// `StoreUnavailable`.
    async fn timed<T, F>(&self, op: StoreOp, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = call.await;
        self.recorder.observe_store_latency(op, start.elapsed());

        result.map_err(|e| {
            self.recorder.record_store_error();
            match e {
                Error::StoreUnavailable(msg) => Error::StoreUnavailable(msg),
                other => Error::StoreUnavailable(other.to_string()),
            }
        })
    }
}

impl std::fmt::Debug for CounterRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterRepository")
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
