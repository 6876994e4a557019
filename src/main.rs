//! reqrank server
//!
//! Serves FizzBuzz over HTTP and reports the most requested parameters.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          reqrank server                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │     HTTP     │───▶│  Repository  │───▶│ Redis/Memory │       │
//! │  │   handlers   │    │   Ranking    │    │              │       │
//! │  └──────────────┘    └──────────────┘    └──────▲───────┘       │
//! │                                                 │               │
//! │                                          ┌──────┴───────┐       │
//! │                                          │ Health loop  │       │
//! │                                          └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reqrank::adapters::{MemoryStore, PrometheusRecorder, RedisStore};
use reqrank::api::{self, health, AppState};
use reqrank::cache::{CounterRepository, RankingConfig, RankingQuery, RepositoryConfig};
use reqrank::domain::{CacheRecorder, Store};
use reqrank::error::{Error, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// reqrank - FizzBuzz server with request popularity ranking
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP server bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Redis URL; counters are kept in process memory when unset
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Maximum optimistic transaction attempts per increment
    #[arg(long, env = "MAX_TX_RETRIES", default_value = "1000")]
    max_tx_retries: usize,

    /// Deadline for ranking reads in milliseconds
    #[arg(long, env = "READ_TIMEOUT_MS", default_value = "500")]
    read_timeout_ms: u64,

    /// Optional wall-clock bound on one increment, in milliseconds
    #[arg(long, env = "INCREMENT_TIMEOUT_MS")]
    increment_timeout_ms: Option<u64>,

    /// Store health check interval in seconds
    #[arg(long, env = "HEALTH_INTERVAL_SECONDS", default_value = "5")]
    health_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn repository_config(&self) -> Result<RepositoryConfig> {
        let config = RepositoryConfig {
            max_retries: self.max_tx_retries,
            increment_timeout: self.increment_timeout_ms.map(Duration::from_millis),
        };
        config.validate()?;
        Ok(config)
    }

    fn ranking_config(&self) -> Result<RankingConfig> {
        if self.read_timeout_ms == 0 {
            return Err(Error::Config("read timeout must be positive".into()));
        }
        Ok(RankingConfig {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        })
    }

    fn health_interval(&self) -> Result<Duration> {
        if self.health_interval_secs == 0 {
            return Err(Error::Config("health interval must be positive".into()));
        }
        Ok(Duration::from_secs(self.health_interval_secs))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting reqrank {}", reqrank::VERSION);
    info!("  Listen address: {}", args.listen);
    info!("  Max transaction retries: {}", args.max_tx_retries);
    info!("  Read timeout: {} ms", args.read_timeout_ms);
    match args.increment_timeout_ms {
        Some(ms) => info!("  Increment timeout: {} ms", ms),
        None => info!("  Increment timeout: unbounded"),
    }

    let repo_config = args.repository_config()?;
    let ranking_config = args.ranking_config()?;
    let health_interval = args.health_interval()?;

    let store: Arc<dyn Store> = match args.redis_url.as_deref() {
        Some(url) => Arc::new(RedisStore::connect(url).await?),
        None => {
            warn!("No redis url configured, counters are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let prometheus = PrometheusRecorder::new()?;
    let registry = prometheus.registry().clone();
    let recorder: Arc<dyn CacheRecorder> = Arc::new(prometheus);

    let repo = Arc::new(CounterRepository::with_config(
        store.clone(),
        recorder.clone(),
        repo_config,
    ));
    let ranking = RankingQuery::with_config(repo.clone(), ranking_config);
    let state = Arc::new(AppState::new(repo, ranking, registry)?);

    let shutdown = CancellationToken::new();

    // Store health loop
    let health_handle = tokio::spawn(health::watch_store(
        store,
        recorder,
        health_interval,
        shutdown.clone(),
    ));

    // Ctrl-C
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    let listener = api::bind(&args.listen).await?;
    let served = api::serve(listener, state, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = health_handle.await {
        warn!("Health loop ended abnormally: {}", e);
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "h2=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
