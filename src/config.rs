//! Runtime configuration loaded from the environment at bootstrap.
//!
//! Configuration is read once, validated, and then treated as read-only for
//! the process lifetime. A missing `FRED_API_KEY` is a fatal startup error.

use std::time::Duration;

use crate::error::{FredQueryError, Result};

/// Default HTTP request timeout
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum concurrent connections to the FRED host
pub(crate) const MAX_CONNECTIONS_PER_HOST: usize = 20;

/// Cache backend selected at bootstrap, never per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// In-process map. Default.
    Memory,
    /// One file per entry under `CACHE_DISK_ROOT`
    Disk,
    /// Redis, addressed by `CACHE_EXTERNAL_URL`
    External,
}

impl CacheBackendKind {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(Self::Memory),
            "disk" => Ok(Self::Disk),
            "external" => Ok(Self::External),
            other => Err(FredQueryError::Config {
                context: format!("CACHE_BACKEND must be memory|disk|external, got '{other}'"),
            }),
        }
    }
}

/// Log output format for the structured per-request records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    Plain,
    /// Newline-delimited JSON
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(FredQueryError::Config {
                context: format!("LOG_FORMAT must be plain|json, got '{other}'"),
            }),
        }
    }
}

/// Process-wide configuration. Built once at bootstrap, shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    /// FRED API key. Required.
    pub api_key: String,
    /// Base URL for the FRED API (overridable for testing)
    pub base_url: String,
    /// Unified User-Agent for all outbound requests
    pub user_agent: String,
    /// Hard per-request timeout
    pub timeout: Duration,
    /// Which cache backend to construct
    pub cache_backend: CacheBackendKind,
    /// Fallback TTL for namespaces without an explicit default
    pub cache_default_ttl: u64,
    /// Connection string for the external (Redis) backend
    pub cache_external_url: Option<String>,
    /// Root directory for the disk backend
    pub cache_disk_root: String,
    /// Maximum FRED requests per rolling window
    pub rate_limit_max: usize,
    /// Rolling window length in seconds
    pub rate_limit_window: Duration,
    /// Log level threshold (consumed by the binary's subscriber)
    pub log_level: String,
    /// Log output format (consumed by the binary's subscriber)
    pub log_format: LogFormat,
    /// Maximum regions per inflation comparison
    pub inflation_max_regions: usize,
    /// Concurrent FRED calls inside the inflation workflow
    pub inflation_fanout: usize,
    /// Maximum countries per GDP analysis. The single authoritative bound.
    pub gdp_max_countries: usize,
    /// Concurrent FRED calls inside the GDP workflow
    pub gdp_fanout: usize,
    /// Probe FRED at startup to verify the static series tables
    pub validate_series_at_startup: bool,
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| FredQueryError::Config {
            context: format!("{name} is not a valid value: '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`FredQueryError::Config`] when `FRED_API_KEY` is absent or any
    /// variable fails to parse. Callers should treat this as fatal.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("FRED_API_KEY").map_err(|_| FredQueryError::Config {
            context: "FRED_API_KEY is required. Get a free key at \
                      https://fred.stlouisfed.org/docs/api/api_key.html"
                .to_string(),
        })?;
        if api_key.trim().is_empty() {
            return Err(FredQueryError::Config {
                context: "FRED_API_KEY is empty".to_string(),
            });
        }

        let cache_backend = CacheBackendKind::parse(&env_string("CACHE_BACKEND", "memory"))?;
        let cache_external_url = std::env::var("CACHE_EXTERNAL_URL").ok();
        if cache_backend == CacheBackendKind::External && cache_external_url.is_none() {
            return Err(FredQueryError::Config {
                context: "CACHE_BACKEND=external requires CACHE_EXTERNAL_URL".to_string(),
            });
        }

        let rate_limit_max: usize = env_parse("RATE_LIMIT_MAX", 120)?;
        if rate_limit_max == 0 {
            return Err(FredQueryError::Config {
                context: "RATE_LIMIT_MAX must be at least 1".to_string(),
            });
        }

        Ok(Self {
            api_key,
            base_url: env_string("FRED_BASE_URL", "https://api.stlouisfed.org"),
            user_agent: env_string(
                "FRED_USER_AGENT",
                &format!("fred-query/{}", env!("CARGO_PKG_VERSION")),
            ),
            timeout: DEFAULT_TIMEOUT,
            cache_backend,
            cache_default_ttl: env_parse("CACHE_DEFAULT_TTL", 300)?,
            cache_external_url,
            cache_disk_root: env_string("CACHE_DISK_ROOT", ".fred-query-cache"),
            rate_limit_max,
            rate_limit_window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECONDS", 60)?),
            log_level: env_string("LOG_LEVEL", "INFO"),
            log_format: LogFormat::parse(&env_string("LOG_FORMAT", "plain"))?,
            inflation_max_regions: env_parse("INFLATION_MAX_REGIONS", 5)?,
            inflation_fanout: env_parse("INFLATION_FANOUT", 8)?,
            gdp_max_countries: env_parse("GDP_MAX_COUNTRIES", 20)?,
            gdp_fanout: env_parse("GDP_FANOUT", 10)?,
            validate_series_at_startup: env_parse("VALIDATE_SERIES_AT_STARTUP", false)?,
        })
    }

    /// Create a builder seeded with defaults and a test API key.
    ///
    /// Intended for tests and embedders that configure programmatically.
    pub fn builder(api_key: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(api_key)
    }
}

/// Builder for [`Config`]
///
/// ```
/// use fred_query::Config;
///
/// let config = Config::builder("my-key")
///     .base_url("http://127.0.0.1:9999")
///     .rate_limit(10, std::time::Duration::from_secs(1))
///     .build();
/// assert_eq!(config.rate_limit_max, 10);
/// ```
#[derive(Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            config: Config {
                api_key: api_key.into(),
                base_url: "https://api.stlouisfed.org".to_string(),
                user_agent: format!("fred-query/{}", env!("CARGO_PKG_VERSION")),
                timeout: DEFAULT_TIMEOUT,
                cache_backend: CacheBackendKind::Memory,
                cache_default_ttl: 300,
                cache_external_url: None,
                cache_disk_root: ".fred-query-cache".to_string(),
                rate_limit_max: 120,
                rate_limit_window: Duration::from_secs(60),
                log_level: "INFO".to_string(),
                log_format: LogFormat::Plain,
                inflation_max_regions: 5,
                inflation_fanout: 8,
                gdp_max_countries: 20,
                gdp_fanout: 10,
                validate_series_at_startup: false,
            },
        }
    }

    /// Override the FRED base URL (tests point this at a mock server)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Override the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Select the cache backend
    pub fn cache_backend(mut self, kind: CacheBackendKind) -> Self {
        self.config.cache_backend = kind;
        self
    }

    /// Set the disk cache root directory
    pub fn cache_disk_root(mut self, root: impl Into<String>) -> Self {
        self.config.cache_disk_root = root.into();
        self
    }

    /// Set the rate limit window
    pub fn rate_limit(mut self, max: usize, window: Duration) -> Self {
        self.config.rate_limit_max = max;
        self.config.rate_limit_window = window;
        self
    }

    /// Set workflow fanout bounds
    pub fn fanout(mut self, inflation: usize, gdp: usize) -> Self {
        self.config.inflation_fanout = inflation;
        self.config.gdp_fanout = gdp;
        self
    }

    /// Build the Config
    pub fn build(self) -> Config {
        self.config
    }
}
