//! Cross-region inflation comparison.
//!
//! Fans out one year-over-year (`units=pc1`) observation fetch per region,
//! inner-joins on observation dates, then layers the requested analyses:
//! latest snapshot and target distance, base-effect detection, per-region
//! trends, and cross-region convergence. Comparability warnings are derived
//! deterministically from the static region table.

use std::collections::BTreeMap;

use futures::StreamExt;
use serde_json::{Map, Value, json};

use super::regions::{self, IndexType, RegionInflation};
use super::{inner_join, stats};
use crate::AppContext;
use crate::error::{FredQueryError, Result};
use crate::response::{ToolResponse, echo_metadata};

const TOOL: &str = "compare_inflation_across_regions";

/// Aligned points included in the response; analysis uses the full window.
const RESPONSE_POINTS: usize = 24;

/// Sticky-inflation rule: above this level in each of the last N points
const STICKY_THRESHOLD: f64 = 3.0;
const STICKY_POINTS: usize = 6;

/// Base-effect rule: a drop of this size within 2 periods followed by a rise
/// of the same size within 6 periods
const BASE_EFFECT_SWING: f64 = 1.5;

/// Which analyses to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflationMetric {
    /// Latest aligned snapshot and target analysis only
    Latest,
    /// Snapshot plus per-region trends
    Trend,
    /// Everything, including cross-region convergence
    All,
}

impl InflationMetric {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "latest" => Ok(InflationMetric::Latest),
            "trend" => Ok(InflationMetric::Trend),
            "all" => Ok(InflationMetric::All),
            other => Err(FredQueryError::invalid(
                "metric",
                format!("'{other}' is not one of latest|trend|all"),
            )),
        }
    }
}

/// Arguments for `compare_inflation_across_regions`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct InflationArgs {
    /// Comma-delimited region codes and/or presets
    /// (`g7`, `brics`, `eurozone_core`, `eurozone_periphery`, `nordic`,
    /// `north_america`, `asia_pacific`, `europe_major`)
    pub regions: String,
    /// Window start as `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    /// Window end as `YYYY-MM-DD`
    #[serde(default)]
    pub end_date: Option<String>,
    /// Analysis depth: latest|trend|all (default latest)
    #[serde(default)]
    pub metric: Option<String>,
}

/// Compare year-over-year inflation across regions.
pub async fn compare_inflation_across_regions(
    ctx: &AppContext,
    args: InflationArgs,
) -> ToolResponse {
    let metric_str = args.metric.clone().unwrap_or_else(|| "latest".to_string());
    let mut metadata = echo_metadata(&[
        ("regions", json!(args.regions)),
        ("start_date", json!(args.start_date)),
        ("end_date", json!(args.end_date)),
        ("metric", json!(metric_str)),
    ]);

    match run(ctx, &args, &metric_str).await {
        Ok(outcome) => {
            metadata.insert("series_used".to_string(), outcome.series_used);
            ToolResponse::success(TOOL, outcome.data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

struct Outcome {
    data: Value,
    series_used: Value,
}

async fn run(ctx: &AppContext, args: &InflationArgs, metric_str: &str) -> Result<Outcome> {
    let metric = InflationMetric::parse(metric_str)?;
    crate::tools::validate_date_range(
        "start_date",
        args.start_date.as_deref(),
        "end_date",
        args.end_date.as_deref(),
    )?;
    if args.regions.trim().is_empty() {
        return Err(FredQueryError::invalid("regions", "must not be empty"));
    }

    // Expand presets, dedup, clamp to the configured cap
    let inputs: Vec<String> = args.regions.split(',').map(|s| s.trim().to_string()).collect();
    let (mut codes, mut warnings) = regions::expand_regions(&inputs);
    let cap = ctx.config.inflation_max_regions;
    if codes.len() > cap {
        warnings.push(format!(
            "{} regions requested, clamped to the configured maximum of {cap}: dropped {}",
            codes.len(),
            codes[cap..].join(", ")
        ));
        codes.truncate(cap);
    }
    if codes.is_empty() {
        return Err(FredQueryError::invalid(
            "regions",
            "no known regions after expansion",
        ));
    }

    let selected: Vec<&'static RegionInflation> = codes
        .iter()
        .map(|code| regions::lookup(code).expect("expanded codes are in the table"))
        .collect();

    // Parallel fetch, bounded fanout
    let fetches = futures::stream::iter(selected.iter().map(|region| {
        let client = &ctx.client;
        let start = args.start_date.clone();
        let end = args.end_date.clone();
        async move {
            let result = client
                .observations(
                    TOOL,
                    region.series_id,
                    start.as_deref(),
                    end.as_deref(),
                    Some("pc1"),
                    None,
                )
                .await;
            (*region, result)
        }
    }))
    .buffer_unordered(ctx.config.inflation_fanout.max(1))
    .collect::<Vec<_>>()
    .await;

    let mut fetched: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    let mut used: Vec<&'static RegionInflation> = Vec::new();
    let mut diagnostics = Vec::new();
    for (region, result) in fetches {
        match result {
            Ok(series) => {
                let present: Vec<(String, f64)> = series
                    .observations
                    .iter()
                    .filter_map(|o| o.value.map(|v| (o.date.clone(), v)))
                    .collect();
                if present.is_empty() {
                    warnings.push(format!(
                        "region '{}' returned no observations in the window",
                        region.region_code
                    ));
                    diagnostics.push(format!("{}: empty", region.region_code));
                } else {
                    fetched.insert(region.region_code.to_string(), present);
                    used.push(region);
                }
            }
            Err(e) => {
                warnings.push(format!("region '{}' fetch failed: {e}", region.region_code));
                diagnostics.push(format!("{}: {e}", region.region_code));
            }
        }
    }

    if fetched.is_empty() {
        return Err(FredQueryError::NoDataFetched { diagnostics });
    }

    let (dates, aligned) = inner_join(&fetched);
    if aligned.len() < 2 || dates.is_empty() {
        return Err(FredQueryError::NoCommonDates {
            context: format!(
                "{} region(s) with data but no overlapping dates to compare",
                aligned.len()
            ),
        });
    }
    // Keep the join ordering stable with the region table lookup below
    used.retain(|r| aligned.contains_key(r.region_code));

    let mut comparison = Map::new();
    comparison.insert(
        "latest".to_string(),
        latest_snapshot(&dates, &aligned, &used),
    );
    comparison.insert(
        "base_effects".to_string(),
        base_effects(&dates, &aligned),
    );
    if matches!(metric, InflationMetric::Trend | InflationMetric::All) {
        comparison.insert("trends".to_string(), trends(&aligned));
    }
    if metric == InflationMetric::All {
        comparison.insert("convergence".to_string(), convergence(&dates, &aligned));
    }

    // Truncate the series echoed in the response
    let start = dates.len().saturating_sub(RESPONSE_POINTS);
    let series_out: Map<String, Value> = aligned
        .iter()
        .map(|(code, values)| {
            let points: Vec<Value> = dates[start..]
                .iter()
                .zip(values[start..].iter())
                .map(|(d, v)| json!({"date": d, "value": v}))
                .collect();
            (code.clone(), Value::Array(points))
        })
        .collect();

    let series_used: Vec<Value> = used
        .iter()
        .map(|r| {
            json!({
                "region": r.region_code,
                "name": r.name,
                "series_id": r.series_id,
                "index_type": r.index_type.as_str(),
                "source": r.source,
                "frequency": r.frequency,
            })
        })
        .collect();

    let data = json!({
        "comparison": comparison,
        "series": series_out,
        "aligned_observations": dates.len(),
        "comparability_warnings": comparability_warnings(&used),
        "warnings": warnings,
        "limitations": [
            "Year-over-year rates inherit base effects from the comparison year",
            "Inner-join alignment drops dates any region is missing",
            format!("Response series truncated to the {RESPONSE_POINTS} most recent aligned points"),
        ],
        "suggestions": [
            "Use metric=all for trend and convergence analysis",
            "Narrow start_date/end_date to focus the comparison window",
        ],
    });

    Ok(Outcome {
        data,
        series_used: Value::Array(series_used),
    })
}

fn latest_snapshot(
    dates: &[String],
    aligned: &BTreeMap<String, Vec<f64>>,
    used: &[&'static RegionInflation],
) -> Value {
    let last = dates.len() - 1;
    let mut ranking: Vec<(&str, f64)> = aligned
        .iter()
        .map(|(code, values)| (code.as_str(), values[last]))
        .collect();
    ranking.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let ranked: Vec<Value> = ranking
        .iter()
        .enumerate()
        .map(|(i, (code, value))| {
            json!({
                "rank": i + 1,
                "region": code,
                "yoy_inflation": value,
            })
        })
        .collect();

    let mut target_analysis = Map::new();
    for region in used {
        let values = &aligned[region.region_code];
        let latest = values[last];
        let mut entry = Map::new();
        entry.insert("latest".to_string(), json!(latest));
        if let Some(target) = region.central_bank_target {
            let distance = latest - target;
            let status = if distance.abs() <= 0.5 {
                "at"
            } else if distance > 0.0 {
                "above"
            } else {
                "below"
            };
            entry.insert("target".to_string(), json!(target));
            entry.insert("distance_from_target".to_string(), json!(distance));
            entry.insert("status".to_string(), json!(status));
        }
        let sticky = values.len() >= STICKY_POINTS
            && values[values.len() - STICKY_POINTS..]
                .iter()
                .all(|v| *v > STICKY_THRESHOLD);
        entry.insert("sticky_inflation".to_string(), json!(sticky));
        if !region.notes.is_empty() {
            entry.insert("notes".to_string(), json!(region.notes));
        }
        target_analysis.insert(region.region_code.to_string(), Value::Object(entry));
    }

    json!({
        "date": dates[last],
        "ranking": ranked,
        "target_analysis": target_analysis,
    })
}

/// A drop of ≥ 1.5pp within 2 periods followed by a rise of ≥ 1.5pp within
/// the next 6 periods flags the series for base effects.
fn base_effects(dates: &[String], aligned: &BTreeMap<String, Vec<f64>>) -> Value {
    let mut flags = Map::new();
    for (code, values) in aligned {
        let mut detected = None;
        'scan: for t in 0..values.len() {
            for k in 1..=2usize {
                let Some(&trough) = values.get(t + k) else {
                    continue;
                };
                if values[t] - trough >= BASE_EFFECT_SWING {
                    let rebound_window = &values[t + k..(t + k + 7).min(values.len())];
                    if rebound_window.iter().any(|v| v - trough >= BASE_EFFECT_SWING) {
                        detected = Some(dates[t + k].clone());
                        break 'scan;
                    }
                }
            }
        }
        flags.insert(
            code.clone(),
            json!({
                "detected": detected.is_some(),
                "trough_date": detected,
            }),
        );
    }
    Value::Object(flags)
}

fn trends(aligned: &BTreeMap<String, Vec<f64>>) -> Value {
    let mut trends = Map::new();
    for (code, values) in aligned {
        let x: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        let entry = match stats::linear_regression(&x, values) {
            Some(fit) => {
                let direction = if fit.slope > 0.02 {
                    "increasing"
                } else if fit.slope < -0.02 {
                    "decreasing"
                } else {
                    "flat"
                };
                json!({
                    "slope": fit.slope,
                    "direction": direction,
                    "velocity_per_period": fit.slope,
                    "r_squared": fit.r_squared,
                })
            }
            None => json!({"slope": null, "direction": "flat", "velocity_per_period": null}),
        };
        trends.insert(code.clone(), entry);
    }
    Value::Object(trends)
}

fn convergence(dates: &[String], aligned: &BTreeMap<String, Vec<f64>>) -> Value {
    let cv_series: Vec<f64> = (0..dates.len())
        .filter_map(|i| {
            let at_date: Vec<f64> = aligned.values().map(|v| v[i]).collect();
            stats::coefficient_of_variation(&at_date)
        })
        .collect();

    let x: Vec<f64> = (0..cv_series.len()).map(|i| i as f64).collect();
    match stats::linear_regression(&x, &cv_series) {
        Some(fit) => {
            let direction = if fit.p_value < 0.05 && fit.slope < 0.0 {
                "converging"
            } else if fit.p_value < 0.05 && fit.slope > 0.0 {
                "diverging"
            } else {
                "stable"
            };
            json!({
                "direction": direction,
                "cv_slope": fit.slope,
                "r_squared": fit.r_squared,
                "p_value": fit.p_value,
                "latest_cv": cv_series.last(),
            })
        }
        None => json!({
            "direction": "stable",
            "note": "insufficient dispersion data for a convergence fit",
        }),
    }
}

/// Deterministic comparability warnings from the selected series' traits.
fn comparability_warnings(used: &[&'static RegionInflation]) -> Vec<String> {
    let mut warnings = Vec::new();

    let has_hicp = used.iter().any(|r| r.index_type == IndexType::Hicp);
    let has_cpi = used.iter().any(|r| r.index_type == IndexType::Cpi);
    if has_hicp && has_cpi {
        let hicp: Vec<&str> = used
            .iter()
            .filter(|r| r.index_type == IndexType::Hicp)
            .map(|r| r.region_code)
            .collect();
        let cpi: Vec<&str> = used
            .iter()
            .filter(|r| r.index_type == IndexType::Cpi)
            .map(|r| r.region_code)
            .collect();
        warnings.push(format!(
            "Mixed index types: HICP ({}) vs CPI ({}); methodologies differ",
            hicp.join(", "),
            cpi.join(", ")
        ));
    }

    let with_housing: Vec<&str> = used
        .iter()
        .filter(|r| r.includes_owner_housing)
        .map(|r| r.region_code)
        .collect();
    let without_housing: Vec<&str> = used
        .iter()
        .filter(|r| !r.includes_owner_housing)
        .map(|r| r.region_code)
        .collect();
    if !with_housing.is_empty() && !without_housing.is_empty() {
        warnings.push(format!(
            "Owner-occupied housing treatment differs: included for {}, excluded for {}",
            with_housing.join(", "),
            without_housing.join(", ")
        ));
    }

    if used.iter().any(|r| r.region_code == "CAN") {
        warnings.push(
            "Canadian CPI includes mortgage interest cost, which mechanically rises with \
             policy rate hikes"
                .to_string(),
        );
    }

    let frequencies: std::collections::BTreeSet<&str> =
        used.iter().map(|r| r.frequency).collect();
    if frequencies.len() > 1 {
        warnings.push(format!(
            "Frequency mismatch across regions ({}); alignment keeps only common dates",
            frequencies.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    if used.iter().any(|r| r.region_code == "USA") {
        warnings.push(
            "USA comparison uses CPI while the Fed targets 2% PCE; CPI typically runs \
             a few tenths above PCE"
                .to_string(),
        );
    }

    warnings
}
