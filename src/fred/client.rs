//! FRED API client: the single chokepoint for outbound HTTP.
//!
//! Every request follows the same pipeline: canonicalize parameters, consult
//! the cache, acquire a rate-limiter ticket, then run a bounded attempt loop
//! with exponential backoff. Callers receive typed errors, never raw
//! transport failures.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::cache::{Cache, ns};
use crate::config::{Config, MAX_CONNECTIONS_PER_HOST};
use crate::error::{FredQueryError, Result};
use crate::fred::models::{Observation, Series, SeriesInfo};
use crate::rate_limiter::RateLimiter;
use crate::telemetry::{Telemetry, log_fred_call};

/// Maximum HTTP attempts per request (1 initial + 2 retries)
const MAX_ATTEMPTS: u32 = 3;

/// Backoff schedule: base 1s, doubling, capped at 5s, ±20% jitter
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 5_000;
const BACKOFF_JITTER: f64 = 0.2;

/// Metadata describing how a payload was obtained.
#[derive(Debug, Clone)]
pub struct FetchMeta {
    /// Served from cache without touching FRED
    pub cache_hit: bool,
    /// HTTP attempts beyond the first
    pub retry_count: u32,
    /// Correlation id for the structured log record
    pub request_id: String,
}

pub(crate) struct FredClientBuilder {
    config: Arc<Config>,
    cache: Arc<Cache>,
    limiter: Arc<RateLimiter>,
    telemetry: Arc<Telemetry>,
}

impl FredClientBuilder {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<Cache>,
        limiter: Arc<RateLimiter>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            config,
            cache,
            limiter,
            telemetry,
        }
    }

    pub fn build(self) -> Result<FredClient> {
        let http = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(MAX_CONNECTIONS_PER_HOST)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(FredQueryError::HttpError)?;

        Ok(FredClient {
            http,
            config: self.config,
            cache: self.cache,
            limiter: self.limiter,
            telemetry: self.telemetry,
        })
    }
}

/// Shared FRED API client. Safe for concurrent use; clone the `Arc` freely.
pub struct FredClient {
    http: reqwest::Client,
    config: Arc<Config>,
    cache: Arc<Cache>,
    limiter: Arc<RateLimiter>,
    telemetry: Arc<Telemetry>,
}

impl FredClient {
    /// Construct a client wired to the shared cache, limiter, and telemetry.
    pub fn new(
        config: Arc<Config>,
        cache: Arc<Cache>,
        limiter: Arc<RateLimiter>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        FredClientBuilder::new(config, cache, limiter, telemetry).build()
    }

    /// Drop empty parameters and sort by key so argument permutations collapse
    /// to one cache entry.
    pub fn canonicalize(params: &[(&str, Option<String>)]) -> Vec<(String, String)> {
        let mut canonical: Vec<(String, String)> = params
            .iter()
            .filter_map(|(k, v)| {
                v.as_ref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (k.to_string(), v.clone()))
            })
            .collect();
        canonical.sort();
        canonical
    }

    /// Fetch a FRED endpoint as JSON, consulting the cache first.
    ///
    /// `tool` labels telemetry and the structured log record; `namespace`
    /// selects the cache partition and its default TTL.
    pub async fn get_json(
        &self,
        tool: &str,
        endpoint: &str,
        params: &[(&str, Option<String>)],
        namespace: &str,
        ttl_override: Option<u64>,
    ) -> Result<(Value, FetchMeta)> {
        let canonical = Self::canonicalize(params);
        let cache_key = Cache::key(endpoint, &canonical);
        let request_id = uuid::Uuid::new_v4().to_string();

        if let Some(payload) = self.cache.get(namespace, &cache_key).await {
            let value: Value = serde_json::from_str(&payload)?;
            log_fred_call(tool, &request_id, 0, "ok", true, 0, None);
            return Ok((
                value,
                FetchMeta {
                    cache_hit: true,
                    retry_count: 0,
                    request_id,
                },
            ));
        }

        let ticket = self.limiter.acquire(namespace).await;
        let timer = self.telemetry.request_timer(tool);
        let url = self.build_url(endpoint, &canonical)?;

        let mut retry_count = 0u32;
        let mut last_error: FredQueryError;

        loop {
            let attempt = retry_count + 1;
            debug!(tool = %tool, endpoint = %endpoint, attempt = attempt, "FRED request");

            match self.attempt(&url).await {
                Ok(value) => {
                    ticket.observe(200);
                    let payload = serde_json::to_string(&value)?;
                    self.cache
                        .set(namespace, &cache_key, payload, ttl_override)
                        .await;
                    let duration_ms = timer.observe("ok");
                    log_fred_call(tool, &request_id, duration_ms, "ok", false, retry_count, None);
                    return Ok((
                        value,
                        FetchMeta {
                            cache_hit: false,
                            retry_count,
                            request_id,
                        },
                    ));
                }
                Err(AttemptError::Fatal(err)) => {
                    if let Some(status) = err_status(&err) {
                        ticket.observe(status);
                    }
                    let status_label = err.kind().as_str();
                    let duration_ms = timer.observe(status_label);
                    log_fred_call(
                        tool,
                        &request_id,
                        duration_ms,
                        status_label,
                        false,
                        retry_count,
                        Some(&err.to_string()),
                    );
                    return Err(err);
                }
                Err(AttemptError::Retriable { status, err }) => {
                    if let Some(status) = status {
                        ticket.observe(status);
                    }
                    last_error = err;
                }
            }

            retry_count += 1;
            if retry_count >= MAX_ATTEMPTS {
                let status_label = last_error.kind().as_str();
                let duration_ms = timer.observe(status_label);
                log_fred_call(
                    tool,
                    &request_id,
                    duration_ms,
                    status_label,
                    false,
                    retry_count,
                    Some(&last_error.to_string()),
                );
                return Err(last_error);
            }

            self.telemetry.retries_total.with_label_values(&[tool]).inc();
            tokio::time::sleep(backoff_delay(retry_count)).await;
        }
    }

    /// Fetch observations for a series, normalized to ascending date order.
    pub async fn observations(
        &self,
        tool: &str,
        series_id: &str,
        observation_start: Option<&str>,
        observation_end: Option<&str>,
        units: Option<&str>,
        frequency: Option<&str>,
    ) -> Result<Series> {
        let params: Vec<(&str, Option<String>)> = vec![
            ("series_id", Some(series_id.to_string())),
            ("observation_start", observation_start.map(String::from)),
            ("observation_end", observation_end.map(String::from)),
            ("units", units.map(String::from)),
            ("frequency", frequency.map(String::from)),
            ("sort_order", Some("asc".to_string())),
        ];
        let (json, _meta) = self
            .get_json(tool, "fred/series/observations", &params, ns::OBSERVATIONS, None)
            .await?;

        let raw = json
            .get("observations")
            .and_then(|v| v.as_array())
            .ok_or_else(|| FredQueryError::ResponseStructureError {
                field: "observations".to_string(),
                context: format!("FRED response for '{series_id}' missing observations array"),
            })?;

        let mut observations: Vec<Observation> = raw
            .iter()
            .filter_map(|obs| {
                let date = obs.get("date")?.as_str()?.to_string();
                let raw_value = obs.get("value")?.as_str()?;
                // FRED uses "." for missing values
                let value = if raw_value == "." {
                    None
                } else {
                    raw_value.parse::<f64>().ok().filter(|v| v.is_finite())
                };
                Some(Observation { date, value })
            })
            .collect();
        // Strictly ascending regardless of upstream order
        observations.sort_by(|a, b| a.date.cmp(&b.date));
        observations.dedup_by(|a, b| a.date == b.date);

        Ok(Series {
            id: series_id.to_string(),
            observations,
        })
    }

    /// Fetch metadata for a single series.
    pub async fn series_info(&self, tool: &str, series_id: &str) -> Result<SeriesInfo> {
        let params: Vec<(&str, Option<String>)> =
            vec![("series_id", Some(series_id.to_string()))];
        let (json, _meta) = self
            .get_json(tool, "fred/series", &params, ns::SERIES, None)
            .await?;
        let seriess = json
            .get("seriess")
            .and_then(|v| v.as_array())
            .ok_or_else(|| FredQueryError::ResponseStructureError {
                field: "seriess".to_string(),
                context: format!("FRED response for '{series_id}' missing seriess array"),
            })?;
        let first = seriess
            .first()
            .ok_or_else(|| FredQueryError::UpstreamRejected {
                status: 404,
                context: format!("FRED series '{series_id}' not found"),
            })?;
        Ok(serde_json::from_value(first.clone())?)
    }

    fn build_url(&self, endpoint: &str, canonical: &[(String, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        ))
        .map_err(|e| FredQueryError::InvalidParameter {
            param: "endpoint".to_string(),
            reason: e.to_string(),
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_key", &self.config.api_key);
            pairs.append_pair("file_type", "json");
            for (k, v) in canonical {
                pairs.append_pair(k, v);
            }
            pairs.finish();
        }
        Ok(url)
    }

    async fn attempt(&self, url: &Url) -> std::result::Result<Value, AttemptError> {
        let resp = match self.http.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let err = if e.is_timeout() {
                    FredQueryError::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    FredQueryError::HttpError(e)
                };
                return Err(AttemptError::Retriable { status: None, err });
            }
        };

        let status = resp.status();
        match status {
            s if s.is_success() => match resp.json::<Value>().await {
                Ok(value) => Ok(value),
                Err(e) => Err(AttemptError::Retriable {
                    status: Some(status.as_u16()),
                    err: FredQueryError::HttpError(e),
                }),
            },
            StatusCode::TOO_MANY_REQUESTS => Err(AttemptError::Retriable {
                status: Some(429),
                err: FredQueryError::RateLimited {
                    retry_after_ms: Some(BACKOFF_CAP_MS),
                },
            }),
            s if s.is_server_error() => Err(AttemptError::Retriable {
                status: Some(s.as_u16()),
                err: FredQueryError::ServerError {
                    status: s.as_u16(),
                    retry_count: MAX_ATTEMPTS,
                },
            }),
            s => {
                // FRED explains 4xx rejections in an error_message field
                let context = resp
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|v| {
                        v.get("error_message")
                            .and_then(|m| m.as_str())
                            .map(String::from)
                    })
                    .unwrap_or_else(|| format!("HTTP {}", s.as_u16()));
                Err(AttemptError::Fatal(FredQueryError::UpstreamRejected {
                    status: s.as_u16(),
                    context,
                }))
            }
        }
    }
}

enum AttemptError {
    /// Do not retry (4xx other than 429)
    Fatal(FredQueryError),
    /// Retry until the attempt budget runs out
    Retriable {
        status: Option<u16>,
        err: FredQueryError,
    },
}

fn err_status(err: &FredQueryError) -> Option<u16> {
    match err {
        FredQueryError::UpstreamRejected { status, .. } => Some(*status),
        FredQueryError::ServerError { status, .. } => Some(*status),
        FredQueryError::RateLimited { .. } => Some(429),
        _ => None,
    }
}

fn backoff_delay(retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(8);
    let base = (BACKOFF_BASE_MS << exponent).min(BACKOFF_CAP_MS);
    let jitter = rand::thread_rng().gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
    let with_jitter = (base as f64 * (1.0 + jitter)).max(0.0) as u64;
    Duration::from_millis(with_jitter.min(BACKOFF_CAP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_sorts_and_drops_empty() {
        let params: Vec<(&str, Option<String>)> = vec![
            ("units", Some("pc1".to_string())),
            ("series_id", Some("GDP".to_string())),
            ("frequency", None),
            ("observation_start", Some(String::new())),
        ];
        let canonical = FredClient::canonicalize(&params);
        assert_eq!(
            canonical,
            vec![
                ("series_id".to_string(), "GDP".to_string()),
                ("units".to_string(), "pc1".to_string()),
            ]
        );
    }

    #[test]
    fn test_canonicalize_is_permutation_stable() {
        let a: Vec<(&str, Option<String>)> = vec![
            ("series_id", Some("GDP".to_string())),
            ("units", Some("lin".to_string())),
        ];
        let b: Vec<(&str, Option<String>)> = vec![
            ("units", Some("lin".to_string())),
            ("series_id", Some("GDP".to_string())),
        ];
        assert_eq!(FredClient::canonicalize(&a), FredClient::canonicalize(&b));
    }

    #[test]
    fn test_backoff_respects_cap_and_jitter() {
        for retry in 1..6 {
            let delay = backoff_delay(retry);
            assert!(delay <= Duration::from_millis(BACKOFF_CAP_MS));
            assert!(delay >= Duration::from_millis(1));
        }
        // First retry: 1s ±20%
        let first = backoff_delay(1).as_millis() as f64;
        assert!((800.0..=1200.0).contains(&first));
    }
}
