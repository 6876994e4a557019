//! Request Ranking Cache
//!
//! Deduplicates request payloads by content and ranks them by popularity.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          Request Ranking Cache                            │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Hasher                │ CounterRepository         │ RankingQuery         │
//! │  ┌──────────────────┐  │ ┌─────────────────────┐   │ ┌─────────────────┐  │
//! │  │ serde_json bytes │  │ │ watch "counters"    │   │ │ range -1..-1    │  │
//! │  │ XXH64 -> 16 hex  │  │ │ SETNX + ZINCRBY     │   │ │ get data:<hash> │  │
//! │  └──────────────────┘  │ │ retry on conflict   │   │ │ decode payload  │  │
//! │                        │ └─────────────────────┘   │ └─────────────────┘  │
//! │                        └──────────────┬────────────┴──────────┘           │
//! │                                       ▼                                   │
//! │                                 Store (port)                              │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Persisted Layout
//!
//! - `data:<hash>` - canonical payload, written once
//! - `counters` - ordered set, member `<hash>`, score = occurrence count

pub mod hasher;
mod ranking;
mod repository;

pub use hasher::{canonicalize, content_hash, decode, hash_request};
pub use ranking::{RankingConfig, RankingQuery, TopRequest, DEFAULT_READ_TIMEOUT};
pub use repository::{
    data_key, CounterRepository, CounterScore, IncrementOutcome, RankingView, RepositoryConfig,
    COUNTERS_KEY, DEFAULT_MAX_RETRIES,
};
