//! Domain Layer
//!
//! # Architecture
//!
//! The domain layer is organized into:
//!
//! - **Ports** (`ports.rs`) - Store and recorder abstractions plus their value objects
//! - **FizzBuzz** (`fizzbuzz.rs`) - The request type served and ranked by the service
//!
//! # Usage
//!
//! ```no_run
//! use reqrank::domain::ports::{ScoredMember, Store};
//! use reqrank::Result;
//!
//! async fn top(store: &dyn Store) -> Result<Vec<ScoredMember>> {
//!     store.range_by_rank("counters", -1, -1).await
//! }
//! ```

pub mod fizzbuzz;
pub mod ports;

pub use fizzbuzz::{fizzbuzz, FieldError, FizzBuzzRequest, RawFizzBuzzRequest, MAX_LIMIT};
pub use ports::{
    // Port traits
    CacheRecorder,
    // Value objects
    CommitResult,
    ContentHash,
    OpOutcome,
    ScoredMember,
    Store,
    StoreOp,
    Transaction,
    TxOp,
};
