//! Ranking Query
//!
//! Read-side composition over the counter repository: resolves the top of the
//! ranking back into a typed request.
//!
//! The three content outcomes stay distinct:
//!
//! - `NoCountersFound` - nothing recorded yet
//! - `NoDataFound` - a counter exists without its payload
//! - `NoRequestFound` - the payload exists but does not decode

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use super::hasher::decode;
use super::repository::{CounterRepository, RankingView};
use crate::domain::ports::ContentHash;
use crate::error::{Error, Result};

/// Default deadline for ranking reads.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Ranking configuration
#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Deadline applied to each ranking read
    pub read_timeout: Duration,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// The most requested request with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopRequest<T> {
    #[serde(skip)]
    pub hash: ContentHash,
    #[serde(rename = "counter")]
    pub score: u64,
    pub request: T,
}

/// Read side of the ranking cache.
#[derive(Debug, Clone)]
pub struct RankingQuery {
    repo: Arc<CounterRepository>,
    config: RankingConfig,
}

impl RankingQuery {
    pub fn new(repo: Arc<CounterRepository>) -> Self {
        Self::with_config(repo, RankingConfig::default())
    }

    pub fn with_config(repo: Arc<CounterRepository>, config: RankingConfig) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &Arc<CounterRepository> {
        &self.repo
    }

    /// Resolve the highest-scored entry into its typed request.
    pub async fn most_requested<T: DeserializeOwned>(&self) -> Result<TopRequest<T>> {
        self.with_deadline("most_requested", self.resolve_top())
            .await
    }

    /// The `n` highest-scored entries, ascending by score.
    pub async fn top(&self, n: usize) -> Result<RankingView> {
        if n == 0 {
            return Ok(RankingView::default());
        }
        let from = -i64::try_from(n).unwrap_or(i64::MAX);
        self.with_deadline("top", self.repo.get_counters(from, -1))
            .await
    }

    async fn resolve_top<T: DeserializeOwned>(&self) -> Result<TopRequest<T>> {
        let view = self.repo.get_counters(-1, -1).await.map_err(|e| {
            error!(error = %e, "Failed to get top counter");
            e
        })?;

        let Some(top) = view.highest().copied() else {
            debug!("No counters");
            return Err(Error::NoCountersFound);
        };

        let payload = match self.repo.get_data(&top.hash).await {
            Ok(payload) => payload,
            Err(Error::CacheKeyNotFound(key)) => {
                error!(hash = %top.hash, key = %key, "Counter has no stored payload");
                return Err(Error::NoDataFound {
                    hash: top.hash.to_string(),
                });
            }
            Err(e) => {
                error!(hash = %top.hash, error = %e, "Failed to get data");
                return Err(e);
            }
        };

        let request = decode::<T>(&payload).map_err(|e| {
            debug!(hash = %top.hash, error = %e, "No request");
            Error::NoRequestFound {
                hash: top.hash.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(TopRequest {
            hash: top.hash,
            score: top.score,
            request,
        })
    }

    async fn with_deadline<T>(
        &self,
        operation: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.config.read_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| Error::Timeout {
                operation: operation.to_string(),
                duration: limit,
            })?
    }
}

// =============================================================================
// Tests
// =============================================================================
