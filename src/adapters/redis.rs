//! Redis Store Adapter
//!
//! Implements the `Store` port on a Redis server.
//!
//! # Layout
//!
//! - plain keys hold payloads (`data:<hash>`)
//! - sorted sets hold counters (`counters`)
//! - the hash `versions` holds one write counter per key written through a commit
//!
//! # Commit
//!
//! ```text
//! WATCH <watched keys> <written keys>
//! HMGET versions <watched keys>      ── moved since begin? ──▶ Conflict
//! EXISTS <set-if-absent keys>
//! MULTI
//!   SETNX   data:<hash> <payload>     (only when absent)
//!   HINCRBY versions data:<hash> 1    (only when absent)
//!   ZINCRBY counters <delta> <hash>
//!   HINCRBY versions counters 1
//! EXEC                               ── nil ──▶ Conflict
//! ```
//!
//! WATCH is connection-scoped, so every commit runs on its own connection.
//! Reads share one multiplexed connection.

use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, RedisError, Value};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::domain::ports::{CommitResult, OpOutcome, ScoredMember, Store, Transaction, TxOp};
use crate::error::{Error, Result};

/// Hash of per-key write counters.
pub const VERSIONS_KEY: &str = "versions";

fn unavailable(e: RedisError) -> Error {
    Error::StoreUnavailable(format!("redis: {e}"))
}

/// Sorted-set scores are integral counts stored as doubles.
fn score_to_count(score: f64) -> Result<u64> {
    if !score.is_finite() || score < 0.0 || score.fract() != 0.0 || score > u64::MAX as f64 {
        return Err(Error::StoreUnavailable(format!(
            "redis: score {score} is not a count"
        )));
    }
    Ok(score as u64)
}

/// Keys a commit must WATCH: the snapshot keys followed by every written key.
fn watch_list<'a>(watched: &'a [(String, u64)], ops: &'a [TxOp]) -> Vec<&'a str> {
    let mut keys: Vec<&str> = Vec::with_capacity(watched.len() + ops.len());
    for key in watched
        .iter()
        .map(|(k, _)| k.as_str())
        .chain(ops.iter().map(TxOp::key))
    {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Redis-backed implementation of the [`Store`] port.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    reads: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::Config(format!("Invalid redis url {url}: {e}")))?;
        let reads = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        info!(addr = ?client.get_connection_info().addr, "Connected to redis");
        Ok(Self { client, reads })
    }

    async fn versions(
        &self,
        con: &mut MultiplexedConnection,
        keys: &[&str],
    ) -> Result<Vec<u64>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = ::redis::cmd("HMGET");
        cmd.arg(VERSIONS_KEY);
        for key in keys {
            cmd.arg(*key);
        }
        let versions: Vec<Option<u64>> = cmd.query_async(con).await.map_err(unavailable)?;
        Ok(versions.into_iter().map(|v| v.unwrap_or(0)).collect())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .finish()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn begin(&self, keys: &[&str]) -> Result<Transaction> {
        let mut con = self.reads.clone();
        let versions = self.versions(&mut con, keys).await?;
        let watched = keys
            .iter()
            .map(|k| k.to_string())
            .zip(versions)
            .collect();
        Ok(Transaction::new(watched))
    }

    async fn commit(&self, tx: Transaction) -> Result<CommitResult> {
        let (watched, ops) = tx.into_parts();
        let mut con = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;

        let mut watch = ::redis::cmd("WATCH");
        for key in watch_list(&watched, &ops) {
            watch.arg(key);
        }
        let _: () = watch.query_async(&mut con).await.map_err(unavailable)?;

        let keys: Vec<&str> = watched.iter().map(|(k, _)| k.as_str()).collect();
        let current = self.versions(&mut con, &keys).await?;
        if let Some(((key, _), _)) = watched
            .iter()
            .zip(&current)
            .find(|((_, seen), now)| seen != *now)
        {
            trace!(key = %key, "Watched key changed, rejecting commit");
            return Ok(CommitResult::Conflict);
        }

        // Existence is read under WATCH, so it still holds at EXEC.
        let mut absent = Vec::with_capacity(ops.len());
        for op in &ops {
            let is_absent = match op {
                TxOp::SetIfAbsent { key, .. } => {
                    let exists: bool = ::redis::cmd("EXISTS")
                        .arg(key)
                        .query_async(&mut con)
                        .await
                        .map_err(unavailable)?;
                    !exists
                }
                TxOp::IncrementScore { .. } => false,
            };
            absent.push(is_absent);
        }

        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for (op, is_absent) in ops.iter().zip(&absent) {
            match op {
                TxOp::SetIfAbsent { key, value } => {
                    if *is_absent {
                        pipe.cmd("SETNX").arg(key).arg(value.as_ref());
                        pipe.cmd("HINCRBY").arg(VERSIONS_KEY).arg(key).arg(1).ignore();
                    }
                }
                TxOp::IncrementScore { set, member, delta } => {
                    pipe.cmd("ZINCRBY").arg(set).arg(*delta).arg(member);
                    pipe.cmd("HINCRBY").arg(VERSIONS_KEY).arg(set).arg(1).ignore();
                }
            }
        }

        let replies: Option<Vec<Value>> = pipe.query_async(&mut con).await.map_err(unavailable)?;
        let Some(replies) = replies else {
            debug!("EXEC aborted, watched key changed during commit");
            return Ok(CommitResult::Conflict);
        };

        let mut replies = replies.iter();
        let mut outcomes = Vec::with_capacity(ops.len());
        for (op, is_absent) in ops.iter().zip(absent) {
            let outcome = match op {
                TxOp::SetIfAbsent { .. } if !is_absent => OpOutcome::Created(false),
                TxOp::SetIfAbsent { .. } => {
                    let created: bool = next_reply(&mut replies)?;
                    OpOutcome::Created(created)
                }
                TxOp::IncrementScore { .. } => {
                    let score: f64 = next_reply(&mut replies)?;
                    OpOutcome::Score(score_to_count(score)?)
                }
            };
            outcomes.push(outcome);
        }

        Ok(CommitResult::Committed(outcomes))
    }

    async fn range_by_rank(&self, set: &str, from: i64, to: i64) -> Result<Vec<ScoredMember>> {
        let mut con = self.reads.clone();
        let members: Vec<(String, f64)> = ::redis::cmd("ZRANGE")
            .arg(set)
            .arg(from)
            .arg(to)
            .arg("WITHSCORES")
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;

        members
            .into_iter()
            .map(|(member, score)| Ok(ScoredMember::new(member, score_to_count(score)?)))
            .collect()
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut con = self.reads.clone();
        let value: Option<Vec<u8>> = ::redis::cmd("GET")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn health_check(&self) -> Result<bool> {
        let mut con = self.reads.clone();
        let pong: String = ::redis::cmd("PING")
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        Ok(pong == "PONG")
    }
}

fn next_reply<'a, T, I>(replies: &mut I) -> Result<T>
where
    T: ::redis::FromRedisValue,
    I: Iterator<Item = &'a Value>,
{
    let value = replies
        .next()
        .ok_or_else(|| Error::StoreUnavailable("redis: EXEC returned too few replies".into()))?;
    ::redis::from_redis_value(value).map_err(unavailable)
}
