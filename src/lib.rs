//! reqrank - Request Deduplication and Popularity Ranking
//!
//! Stores each distinct request payload once, keyed by its content hash, and
//! keeps a sorted counter of how often every payload was seen. The most
//! requested payload (or any rank window) can then be read back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            reqrank                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Hasher    │───▶│  Repository  │───▶│    Store     │       │
//! │  │  (XXH64 of   │    │ (optimistic  │    │ (data:<hash> │       │
//! │  │  canon JSON) │    │  tx + retry) │    │  + counters) │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │                             │                                    │
//! │                      ┌──────▼───────┐                            │
//! │                      │   Ranking    │                            │
//! │                      │    Query     │                            │
//! │                      └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Store (memory, Redis) and recorder implementations
//! - [`api`] - HTTP surface serving FizzBuzz and the top request
//! - [`cache`] - Hashing, counter repository and ranking query
//! - [`domain`] - Ports and the FizzBuzz domain
//! - [`error`] - Error types

pub mod adapters;
pub mod api;
pub mod cache;
pub mod domain;
pub mod error;

pub use adapters::{
    InMemoryRecorder, MemoryStore, NoopRecorder, PrometheusRecorder, RedisStore,
};
pub use cache::{
    CounterRepository, CounterScore, IncrementOutcome, RankingConfig, RankingQuery, RankingView,
    RepositoryConfig, TopRequest,
};
pub use domain::{CacheRecorder, ContentHash, Store};
pub use error::{Error, Result};

/// Crate version, reported by `/` and the health endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
