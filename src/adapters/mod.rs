//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │            Store            │         CacheRecorder         │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ MemoryStore │ RedisStore │ Prometheus/InMemory/Noop recorder│ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use reqrank::adapters::{MemoryStore, PrometheusRecorder};
//! use reqrank::cache::CounterRepository;
//!
//! # fn main() -> reqrank::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let recorder = Arc::new(PrometheusRecorder::new()?);
//! let repo = CounterRepository::new(store, recorder);
//! # drop(repo);
//! # Ok(())
//! # }
//! ```

mod memory;
mod prometheus;
mod recorder;
mod redis;

pub use memory::{MemoryStore, MemoryStoreStats, SortedSet};
pub use self::prometheus::{PrometheusRecorder, METRICS_NAMESPACE};
pub use recorder::{InMemoryRecorder, NoopRecorder, RecorderSnapshot};
pub use self::redis::{RedisStore, VERSIONS_KEY};
