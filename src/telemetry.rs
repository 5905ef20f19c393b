//! Prometheus-backed metric registry plus structured per-request logging.
//!
//! Unlike a process-global `lazy_static` registry, every [`Telemetry`] owns its
//! own `prometheus::Registry` so tests can construct fresh instances. The
//! bootstrap creates one and shares it through the `AppContext`.

use std::collections::BTreeMap;
use std::time::Instant;

use prometheus::proto::MetricType;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};
use serde_json::{Value, json};

/// Histogram buckets in milliseconds, shared by all duration instruments
const DURATION_BUCKETS_MS: &[f64] = &[50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0];

/// In-process metric registry.
pub struct Telemetry {
    registry: Registry,

    /// Total FRED requests by tool and outcome
    pub fred_requests_total: CounterVec,
    /// Cache hits by namespace
    pub cache_hits_total: CounterVec,
    /// Cache misses by namespace
    pub cache_misses_total: CounterVec,
    /// Times an acquire had to wait on the limiter
    pub rate_limit_blocks_total: Counter,
    /// Retried attempts by tool
    pub retries_total: CounterVec,
    /// Entries currently stored, by namespace
    pub cache_size: GaugeVec,
    /// Active 429 penalty in milliseconds
    pub limiter_active_penalty_ms: Gauge,
    /// End-to-end FRED request duration by tool
    pub fred_request_duration_ms: HistogramVec,
    /// Cache backend operation duration by namespace
    pub cache_op_duration_ms: HistogramVec,

    started_at: Instant,
}

impl Telemetry {
    /// Create a registry with every required instrument registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let fred_requests_total = CounterVec::new(
            Opts::new("fred_requests_total", "Total FRED requests").namespace("fred_query"),
            &["tool", "status"],
        )
        .expect("fred_requests_total opts are static");
        let cache_hits_total = CounterVec::new(
            Opts::new("cache_hits_total", "Total cache hits").namespace("fred_query"),
            &["namespace"],
        )
        .expect("cache_hits_total opts are static");
        let cache_misses_total = CounterVec::new(
            Opts::new("cache_misses_total", "Total cache misses").namespace("fred_query"),
            &["namespace"],
        )
        .expect("cache_misses_total opts are static");
        let rate_limit_blocks_total = Counter::new(
            "rate_limit_blocks_total",
            "Acquires that waited on the rate limiter",
        )
        .expect("rate_limit_blocks_total opts are static");
        let retries_total = CounterVec::new(
            Opts::new("retries_total", "Retried FRED attempts").namespace("fred_query"),
            &["tool"],
        )
        .expect("retries_total opts are static");
        let cache_size = GaugeVec::new(
            Opts::new("cache_size", "Cached entries by namespace").namespace("fred_query"),
            &["namespace"],
        )
        .expect("cache_size opts are static");
        let limiter_active_penalty_ms = Gauge::new(
            "limiter_active_penalty_ms",
            "Active 429 penalty in milliseconds",
        )
        .expect("limiter_active_penalty_ms opts are static");
        let fred_request_duration_ms = HistogramVec::new(
            HistogramOpts::new("fred_request_duration_ms", "FRED request latency (ms)")
                .namespace("fred_query")
                .buckets(DURATION_BUCKETS_MS.to_vec()),
            &["tool"],
        )
        .expect("fred_request_duration_ms opts are static");
        let cache_op_duration_ms = HistogramVec::new(
            HistogramOpts::new("cache_op_duration_ms", "Cache operation latency (ms)")
                .namespace("fred_query")
                .buckets(DURATION_BUCKETS_MS.to_vec()),
            &["namespace"],
        )
        .expect("cache_op_duration_ms opts are static");

        registry
            .register(Box::new(fred_requests_total.clone()))
            .expect("register fred_requests_total");
        registry
            .register(Box::new(cache_hits_total.clone()))
            .expect("register cache_hits_total");
        registry
            .register(Box::new(cache_misses_total.clone()))
            .expect("register cache_misses_total");
        registry
            .register(Box::new(rate_limit_blocks_total.clone()))
            .expect("register rate_limit_blocks_total");
        registry
            .register(Box::new(retries_total.clone()))
            .expect("register retries_total");
        registry
            .register(Box::new(cache_size.clone()))
            .expect("register cache_size");
        registry
            .register(Box::new(limiter_active_penalty_ms.clone()))
            .expect("register limiter_active_penalty_ms");
        registry
            .register(Box::new(fred_request_duration_ms.clone()))
            .expect("register fred_request_duration_ms");
        registry
            .register(Box::new(cache_op_duration_ms.clone()))
            .expect("register cache_op_duration_ms");

        Self {
            registry,
            fred_requests_total,
            cache_hits_total,
            cache_misses_total,
            rate_limit_blocks_total,
            retries_total,
            cache_size,
            limiter_active_penalty_ms,
            fred_request_duration_ms,
            cache_op_duration_ms,
            started_at: Instant::now(),
        }
    }

    /// Seconds since this registry was created (process uptime in practice)
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Serialize counters, gauges, and histogram percentiles to JSON.
    ///
    /// Percentiles are approximated from cumulative bucket counts: the value
    /// reported for a quantile is the upper bound of the first bucket whose
    /// cumulative count reaches it.
    pub fn snapshot(&self) -> Value {
        let mut counters = serde_json::Map::new();
        let mut gauges = serde_json::Map::new();
        let mut histograms = serde_json::Map::new();

        for family in self.registry.gather() {
            let name = family.get_name().to_string();
            match family.get_field_type() {
                MetricType::COUNTER => {
                    let series: Vec<Value> = family
                        .get_metric()
                        .iter()
                        .map(|m| {
                            json!({
                                "labels": label_map(m),
                                "value": m.get_counter().get_value(),
                            })
                        })
                        .collect();
                    counters.insert(name, Value::Array(series));
                }
                MetricType::GAUGE => {
                    let series: Vec<Value> = family
                        .get_metric()
                        .iter()
                        .map(|m| {
                            json!({
                                "labels": label_map(m),
                                "value": m.get_gauge().get_value(),
                            })
                        })
                        .collect();
                    gauges.insert(name, Value::Array(series));
                }
                MetricType::HISTOGRAM => {
                    let series: Vec<Value> = family
                        .get_metric()
                        .iter()
                        .map(|m| {
                            let h = m.get_histogram();
                            json!({
                                "labels": label_map(m),
                                "count": h.get_sample_count(),
                                "sum": h.get_sample_sum(),
                                "p50": bucket_percentile(h, 0.50),
                                "p95": bucket_percentile(h, 0.95),
                                "p99": bucket_percentile(h, 0.99),
                            })
                        })
                        .collect();
                    histograms.insert(name, Value::Array(series));
                }
                _ => {}
            }
        }

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }

    /// Start a timer for one FRED request; observe on completion.
    pub fn request_timer(&self, tool: &str) -> RequestTimer<'_> {
        RequestTimer {
            telemetry: self,
            start: Instant::now(),
            tool: tool.to_string(),
        }
    }

    /// Start a timer for one cache backend operation.
    pub fn cache_timer(&self, namespace: &str) -> CacheTimer<'_> {
        CacheTimer {
            telemetry: self,
            start: Instant::now(),
            namespace: namespace.to_string(),
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn label_map(metric: &prometheus::proto::Metric) -> BTreeMap<String, String> {
    metric
        .get_label()
        .iter()
        .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
        .collect()
}

fn bucket_percentile(h: &prometheus::proto::Histogram, quantile: f64) -> Option<f64> {
    let total = h.get_sample_count();
    if total == 0 {
        return None;
    }
    let rank = (quantile * total as f64).ceil() as u64;
    for bucket in h.get_bucket() {
        if bucket.get_cumulative_count() >= rank {
            return Some(bucket.get_upper_bound());
        }
    }
    // Everything landed above the last finite bucket
    DURATION_BUCKETS_MS.last().copied()
}

/// Tracks one FRED request from start to observation.
pub struct RequestTimer<'a> {
    telemetry: &'a Telemetry,
    start: Instant,
    tool: String,
}

impl RequestTimer<'_> {
    /// Record the outcome and the elapsed duration; returns elapsed ms.
    pub fn observe(self, status: &str) -> u64 {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        self.telemetry
            .fred_request_duration_ms
            .with_label_values(&[&self.tool])
            .observe(elapsed_ms as f64);
        self.telemetry
            .fred_requests_total
            .with_label_values(&[&self.tool, status])
            .inc();
        elapsed_ms
    }
}

/// Tracks one cache backend operation.
pub struct CacheTimer<'a> {
    telemetry: &'a Telemetry,
    start: Instant,
    namespace: String,
}

impl CacheTimer<'_> {
    /// Record the elapsed duration.
    pub fn observe(self) {
        let elapsed_ms = self.start.elapsed().as_millis() as f64;
        self.telemetry
            .cache_op_duration_ms
            .with_label_values(&[&self.namespace])
            .observe(elapsed_ms);
    }
}

/// Emit the single structured record required for every FRED call.
#[allow(clippy::too_many_arguments)]
pub fn log_fred_call(
    tool: &str,
    request_id: &str,
    duration_ms: u64,
    status: &str,
    cache_hit: bool,
    retry_count: u32,
    error: Option<&str>,
) {
    match error {
        Some(err) => tracing::warn!(
            tool = %tool,
            request_id = %request_id,
            duration_ms = duration_ms,
            status = %status,
            cache_hit = cache_hit,
            retry_count = retry_count,
            error = %err,
            "FRED call failed"
        ),
        None => tracing::info!(
            tool = %tool,
            request_id = %request_id,
            duration_ms = duration_ms,
            status = %status,
            cache_hit = cache_hit,
            retry_count = retry_count,
            "FRED call completed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_instruments_register() {
        let telemetry = Telemetry::new();
        telemetry
            .fred_requests_total
            .with_label_values(&["search_fred_series", "ok"])
            .inc();
        telemetry
            .cache_hits_total
            .with_label_values(&["fred:search"])
            .inc();
        telemetry.rate_limit_blocks_total.inc();
        telemetry.limiter_active_penalty_ms.set(500.0);
        telemetry
            .fred_request_duration_ms
            .with_label_values(&["search_fred_series"])
            .observe(120.0);
    }

    #[test]
    fn test_snapshot_shape() {
        let telemetry = Telemetry::new();
        telemetry
            .fred_requests_total
            .with_label_values(&["get_fred_tags", "ok"])
            .inc();
        let snap = telemetry.snapshot();
        assert!(snap.get("counters").is_some());
        assert!(snap.get("gauges").is_some());
        assert!(snap.get("histograms").is_some());
        let counters = snap["counters"].as_object().unwrap();
        assert!(counters.contains_key("fred_query_fred_requests_total"));
    }

    #[test]
    fn test_percentiles_from_buckets() {
        let telemetry = Telemetry::new();
        let hist = telemetry
            .fred_request_duration_ms
            .with_label_values(&["t"]);
        // 90 fast observations, 10 slow ones
        for _ in 0..90 {
            hist.observe(40.0);
        }
        for _ in 0..10 {
            hist.observe(900.0);
        }
        let snap = telemetry.snapshot();
        let series = snap["histograms"]["fred_query_fred_request_duration_ms"]
            .as_array()
            .unwrap();
        let entry = &series[0];
        assert_eq!(entry["count"], 100);
        // p50 lands in the first bucket (<=50ms), p95/p99 in the 1000ms bucket
        assert_eq!(entry["p50"], 50.0);
        assert_eq!(entry["p95"], 1000.0);
        assert_eq!(entry["p99"], 1000.0);
    }

    #[test]
    fn test_empty_histogram_has_no_percentiles() {
        let telemetry = Telemetry::new();
        // Instantiate the label set without observing
        let _ = telemetry
            .fred_request_duration_ms
            .with_label_values(&["idle"]);
        let snap = telemetry.snapshot();
        let series = snap["histograms"]["fred_query_fred_request_duration_ms"]
            .as_array()
            .unwrap();
        assert!(series[0]["p50"].is_null());
    }

    #[test]
    fn test_request_timer_increments_counter() {
        let telemetry = Telemetry::new();
        let timer = telemetry.request_timer("get_fred_category");
        let _ = timer.observe("ok");
        let value = telemetry
            .fred_requests_total
            .with_label_values(&["get_fred_category", "ok"])
            .get();
        assert_eq!(value as i64, 1);
    }
}
