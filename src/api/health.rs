//! Store Health
//!
//! Readiness reporting and the background loop that keeps checking the store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::domain::ports::{CacheRecorder, Store};

/// Result of one store health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreCheck {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Body of `/readyz`.
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub store: StoreCheck,
}

impl From<StoreCheck> for Readiness {
    fn from(store: StoreCheck) -> Self {
        Self {
            ready: store.healthy,
            store,
        }
    }
}

/// Check the store once.
pub async fn check_store(store: &dyn Store) -> StoreCheck {
    let start = Instant::now();
    let (healthy, error) = match store.health_check().await {
        Ok(true) => (true, None),
        Ok(false) => (false, Some("store reported unhealthy".to_string())),
        Err(e) => (false, Some(e.to_string())),
    };
    StoreCheck {
        healthy,
        error,
        latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

/// Check the store every `every` until `shutdown` fires, logging failures.
pub async fn watch_store(
    store: Arc<dyn Store>,
    recorder: Arc<dyn CacheRecorder>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Store health loop stopped");
                return;
            }
            _ = ticker.tick() => {
                let check = check_store(store.as_ref()).await;
                if !check.healthy {
                    recorder.record_store_error();
                    error!(
                        error = check.error.as_deref().unwrap_or(""),
                        "Can't reach store"
                    );
                }
            }
        }
    }
}
