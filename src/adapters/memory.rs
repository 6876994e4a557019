//! In-Memory Store Adapter
//!
//! Implements the `Store` port inside the process.
//!
//! # Design
//!
//! - One `RwLock` guards the whole keyspace: reads share it, commits take it
//!   exclusively, so a commit's writes become visible all at once
//! - Every write stamps the key with a fresh version from a keyspace-wide clock
//! - `begin` snapshots watched versions; `commit` rejects the transaction if any
//!   of them moved

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::trace;

use crate::domain::ports::{CommitResult, OpOutcome, ScoredMember, Store, Transaction, TxOp};
use crate::error::{Error, Result};

/// Ordered set of members by score, ties broken by member.
#[derive(Debug, Default, Clone)]
pub struct SortedSet {
    scores: HashMap<String, u64>,
    order: BTreeSet<(u64, String)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &str) -> Option<u64> {
        self.scores.get(member).copied()
    }

    /// Add `delta` to `member`, inserting it at `delta` if absent. Returns the new score.
    pub fn increment(&mut self, member: &str, delta: u64) -> u64 {
        let new_score = match self.scores.get_mut(member) {
            Some(score) => {
                self.order.remove(&(*score, member.to_string()));
                *score = score.saturating_add(delta);
                *score
            }
            None => {
                self.scores.insert(member.to_string(), delta);
                delta
            }
        };
        self.order.insert((new_score, member.to_string()));
        new_score
    }

    /// Inclusive rank window, ascending. Negative ranks count from the end.
    pub fn range(&self, from: i64, to: i64) -> Vec<ScoredMember> {
        let len = self.order.len() as i64;
        let start = if from < 0 { len + from } else { from }.max(0);
        let stop = if to < 0 { len + to } else { to }.min(len - 1);

        if len == 0 || start > stop || start >= len {
            return Vec::new();
        }

        self.order
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(score, member)| ScoredMember::new(member.clone(), *score))
            .collect()
    }
}

/// Keyspace guarded by the store lock.
#[derive(Debug, Default)]
struct Keyspace {
    values: HashMap<String, Bytes>,
    sets: HashMap<String, SortedSet>,
    versions: HashMap<String, u64>,
    clock: u64,
}

impl Keyspace {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn apply(&mut self, op: TxOp) -> OpOutcome {
        match op {
            TxOp::SetIfAbsent { key, value } => {
                if self.values.contains_key(&key) {
                    OpOutcome::Created(false)
                } else {
                    self.touch(&key);
                    self.values.insert(key, value);
                    OpOutcome::Created(true)
                }
            }
            TxOp::IncrementScore { set, member, delta } => {
                self.touch(&set);
                let score = self.sets.entry(set).or_default().increment(&member, delta);
                OpOutcome::Score(score)
            }
        }
    }
}

/// Memory store statistics
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreStats {
    /// Plain keys stored
    pub value_count: u64,
    /// Ordered sets stored
    pub set_count: u64,
    /// Read operations
    pub reads: u64,
    /// Successful commits
    pub commits: u64,
    /// Rejected commits
    pub conflicts: u64,
}

/// In-process implementation of the [`Store`] port.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    reads: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
    /// Commits still to be rejected regardless of versions.
    injected_conflicts: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` commits with a conflict. `u64::MAX` rejects forever.
    pub fn inject_conflicts(&self, count: u64) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make every call fail with `StoreUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delete a plain key outside any transaction, bumping its version.
    ///
    /// The cache core never deletes; this exists for administration and for
    /// reproducing a counter whose payload went missing.
    pub fn remove(&self, key: &str) -> Option<Bytes> {
        let mut keyspace = self.keyspace.write();
        let removed = keyspace.values.remove(key);
        if removed.is_some() {
            keyspace.touch(key);
        }
        removed
    }

    /// Current score of `member` in `set`.
    pub fn score(&self, set: &str, member: &str) -> Option<u64> {
        self.keyspace
            .read()
            .sets
            .get(set)
            .and_then(|s| s.score(member))
    }

    /// Whether a plain key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.keyspace.read().values.contains_key(key)
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let keyspace = self.keyspace.read();
        MemoryStoreStats {
            value_count: keyspace.values.len() as u64,
            set_count: keyspace.sets.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u64::MAX => Some(u64::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self, keys: &[&str]) -> Result<Transaction> {
        self.ensure_available()?;
        let keyspace = self.keyspace.read();
        let watched = keys
            .iter()
            .map(|k| (k.to_string(), keyspace.version(k)))
            .collect();
        Ok(Transaction::new(watched))
    }

    async fn commit(&self, tx: Transaction) -> Result<CommitResult> {
        self.ensure_available()?;

        if self.take_injected_conflict() {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(CommitResult::Conflict);
        }

        let (watched, ops) = tx.into_parts();
        let mut keyspace = self.keyspace.write();

        if let Some((key, _)) = watched
            .iter()
            .find(|(key, version)| keyspace.version(key) != *version)
        {
            trace!(key = %key, "Watched key changed, rejecting commit");
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(CommitResult::Conflict);
        }

        let outcomes = ops.into_iter().map(|op| keyspace.apply(op)).collect();
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(CommitResult::Committed(outcomes))
    }

    async fn range_by_rank(&self, set: &str, from: i64, to: i64) -> Result<Vec<ScoredMember>> {
        self.ensure_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .keyspace
            .read()
            .sets
            .get(set)
            .map(|s| s.range(from, to))
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.ensure_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.keyspace.read().values.get(key).cloned())
    }

    async fn health_check(&self) -> Result<bool> {
        self.ensure_available()?;
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================
