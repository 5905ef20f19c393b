//! # fred-query
//!
//! A Rust library for querying FRED (Federal Reserve Economic Data) with a
//! shared request-execution substrate: a namespaced multi-backend cache, a
//! coordinated rate limiter, an in-process telemetry registry, and a retrying
//! HTTP client that every tool funnels through. On top of the per-endpoint
//! tools sit two cross-country workflow orchestrators for inflation and GDP
//! analysis.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fred_query::{AppContext, Config};
//! use fred_query::tools::search::{self, SearchSeriesArgs};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let ctx = AppContext::new(config).await?;
//!
//!     let args = SearchSeriesArgs {
//!         search_text: "unemployment".to_string(),
//!         ..Default::default()
//!     };
//!     let response = search::search_fred_series(&ctx, args).await;
//!     println!("{}", response.to_compact_json());
//!     Ok(())
//! }
//! ```
//!
//! The MCP stdio server lives in the `fred-query-mcp` workspace member; this
//! crate knows nothing about transports.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Namespaced TTL cache with pluggable backends
pub mod cache;
/// Environment-driven runtime configuration
pub mod config;
/// Error types and result definitions
pub mod error;
/// FRED API client and data models
pub mod fred;
/// Rolling-window rate limiter with 429 penalties
pub mod rate_limiter;
/// Tool response envelope
pub mod response;
/// Metric registry and structured request logging
pub mod telemetry;
/// Per-endpoint tool orchestrators
pub mod tools;
/// Cross-country inflation and GDP workflows
pub mod workflows;

use std::sync::Arc;

pub use cache::Cache;
pub use config::{CacheBackendKind, Config, ConfigBuilder, LogFormat};
pub use error::{ErrorKind, FredQueryError, Result};
pub use fred::FredClient;
pub use rate_limiter::RateLimiter;
pub use response::ToolResponse;
pub use telemetry::Telemetry;

/// Process-wide shared state: configuration, cache, limiter, telemetry, and
/// the FRED client. Built once at bootstrap, shared by every tool invocation.
///
/// Nothing here is a module-level singleton; tests construct fresh contexts
/// with [`Config::builder`].
pub struct AppContext {
    /// Read-only runtime configuration
    pub config: Arc<Config>,
    /// Shared response cache
    pub cache: Arc<Cache>,
    /// Global FRED rate limiter
    pub limiter: Arc<RateLimiter>,
    /// Metric registry
    pub telemetry: Arc<Telemetry>,
    /// FRED API client
    pub client: FredClient,
}

impl AppContext {
    /// Wire up the full substrate from a validated configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Arc::new(Telemetry::new());
        let cache = Arc::new(Cache::from_config(&config, Arc::clone(&telemetry)).await?);
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max,
            config.rate_limit_window,
            Arc::clone(&telemetry),
        ));
        let client = FredClient::new(
            Arc::clone(&config),
            Arc::clone(&cache),
            Arc::clone(&limiter),
            Arc::clone(&telemetry),
        )?;
        Ok(Self {
            config,
            cache,
            limiter,
            telemetry,
            client,
        })
    }
}
