//! Cross-country workflow orchestrators.
//!
//! A workflow is a tool that issues many FRED calls concurrently (bounded
//! fanout through the shared client, so the cache, limiter, and retry policy
//! all apply), aligns the resulting series on observation dates, and runs the
//! statistical analysis before shaping one response.

pub mod countries;
pub mod gdp;
pub mod inflation;
pub mod regions;
pub mod stats;

use std::collections::BTreeMap;

use crate::AppContext;
use crate::error::{FredQueryError, Result};

/// How to join per-series dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMethod {
    /// Keep only dates present in every series
    Inner,
    /// Keep the union of dates; gaps are handled by the fill policy
    Outer,
}

impl AlignMethod {
    /// Parse a wire value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "inner" => Ok(AlignMethod::Inner),
            "outer" => Ok(AlignMethod::Outer),
            other => Err(FredQueryError::invalid(
                "align_method",
                format!("'{other}' is not one of inner|outer"),
            )),
        }
    }
}

/// How to handle gaps after an outer join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMissing {
    /// Linear interpolation between neighboring present values
    Interpolate,
    /// Carry the last present value forward
    Forward,
    /// Leave gaps; downstream statistics skip them
    Drop,
}

impl FillMissing {
    /// Parse a wire value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "interpolate" => Ok(FillMissing::Interpolate),
            "forward" => Ok(FillMissing::Forward),
            "drop" => Ok(FillMissing::Drop),
            other => Err(FredQueryError::invalid(
                "fill_missing",
                format!("'{other}' is not one of interpolate|forward|drop"),
            )),
        }
    }
}

/// Inner-join present values across series: the returned dates appear, with a
/// value, in every input series.
pub(crate) fn inner_join(
    series: &BTreeMap<String, Vec<(String, f64)>>,
) -> (Vec<String>, BTreeMap<String, Vec<f64>>) {
    if series.is_empty() {
        return (Vec::new(), BTreeMap::new());
    }

    let maps: BTreeMap<&str, BTreeMap<&str, f64>> = series
        .iter()
        .map(|(code, obs)| {
            (
                code.as_str(),
                obs.iter().map(|(d, v)| (d.as_str(), *v)).collect(),
            )
        })
        .collect();

    let mut common: Vec<String> = Vec::new();
    if let Some(first) = maps.values().next() {
        for date in first.keys() {
            if maps.values().all(|m| m.contains_key(date)) {
                common.push((*date).to_string());
            }
        }
    }
    common.sort();

    let aligned = maps
        .iter()
        .map(|(code, m)| {
            (
                (*code).to_string(),
                common.iter().map(|d| m[d.as_str()]).collect(),
            )
        })
        .collect();
    (common, aligned)
}

/// Outer-join across series: the union of dates, with `None` where a series
/// has no value.
pub(crate) fn outer_join(
    series: &BTreeMap<String, Vec<(String, f64)>>,
) -> (Vec<String>, BTreeMap<String, Vec<Option<f64>>>) {
    let mut dates: Vec<String> = series
        .values()
        .flat_map(|obs| obs.iter().map(|(d, _)| d.clone()))
        .collect();
    dates.sort();
    dates.dedup();

    let aligned = series
        .iter()
        .map(|(code, obs)| {
            let m: BTreeMap<&str, f64> = obs.iter().map(|(d, v)| (d.as_str(), *v)).collect();
            (
                code.clone(),
                dates.iter().map(|d| m.get(d.as_str()).copied()).collect(),
            )
        })
        .collect();
    (dates, aligned)
}

/// Apply the gap-fill policy in place. Leading gaps stay `None` under every
/// policy; `Drop` leaves the vector untouched.
pub(crate) fn fill_gaps(values: &mut [Option<f64>], policy: FillMissing) {
    match policy {
        FillMissing::Drop => {}
        FillMissing::Forward => {
            let mut last = None;
            for slot in values.iter_mut() {
                match slot {
                    Some(v) => last = Some(*v),
                    None => *slot = last,
                }
            }
        }
        FillMissing::Interpolate => {
            let n = values.len();
            let mut i = 0;
            while i < n {
                if values[i].is_none() {
                    let prev = (0..i).rev().find(|&j| values[j].is_some());
                    let next = (i + 1..n).find(|&j| values[j].is_some());
                    if let (Some(p), Some(q)) = (prev, next) {
                        let v0 = values[p].unwrap();
                        let v1 = values[q].unwrap();
                        let span = (q - p) as f64;
                        for j in p + 1..q {
                            let t = (j - p) as f64 / span;
                            values[j] = Some(v0 + (v1 - v0) * t);
                        }
                        i = q;
                        continue;
                    }
                }
                i += 1;
            }
        }
    }
}

/// Probe FRED for every series id in the static tables, rejecting entries
/// that no longer resolve to an index series of the claimed type.
///
/// Enabled by `VALIDATE_SERIES_AT_STARTUP`; failures are fatal configuration
/// errors so a stale mapping never silently ships bad data.
pub async fn validate_reference_tables(ctx: &AppContext) -> Result<()> {
    for region in regions::REGION_TABLE {
        let info = ctx
            .client
            .series_info("bootstrap_validation", region.series_id)
            .await?;
        if !info.is_index_series() {
            return Err(FredQueryError::Config {
                context: format!(
                    "region '{}' maps to '{}' whose units are {:?}, expected an index series",
                    region.region_code, region.series_id, info.units
                ),
            });
        }
    }
    for country in countries::COUNTRY_TABLE {
        // Per-capita constant is the workflow default; its absence for a
        // listed country is a table bug worth failing on.
        let series_id = countries::GdpVariant::PerCapitaConstant
            .series_id(country.code)
            .expect("per_capita_constant always has a series id");
        ctx.client
            .series_info("bootstrap_validation", &series_id)
            .await?;
    }
    Ok(())
}
