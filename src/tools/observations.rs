//! Series observations with optional transformation and frequency
//! aggregation, delegated to FRED's server-side `units`/`frequency` support.

use serde::Deserialize;
use serde_json::{Value, json};

use super::validate_date_range;
use crate::AppContext;
use crate::cache::ns;
use crate::error::{FredQueryError, Result};
use crate::response::{ToolResponse, echo_metadata};

const TOOL: &str = "get_fred_series_observations";

/// FRED transformation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    /// Levels (no transformation)
    Lin,
    /// Change from previous period
    Chg,
    /// Change from a year ago
    Ch1,
    /// Percent change
    Pch,
    /// Percent change from a year ago
    Pc1,
    /// Compounded annual rate of change
    Pca,
    /// Continuously compounded rate of change
    Cch,
    /// Continuously compounded annual rate of change
    Cca,
    /// Natural log
    Log,
}

impl Units {
    /// Wire representation for FRED's `units` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Lin => "lin",
            Units::Chg => "chg",
            Units::Ch1 => "ch1",
            Units::Pch => "pch",
            Units::Pc1 => "pc1",
            Units::Pca => "pca",
            Units::Cch => "cch",
            Units::Cca => "cca",
            Units::Log => "log",
        }
    }

    /// Parse a wire value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "lin" => Ok(Units::Lin),
            "chg" => Ok(Units::Chg),
            "ch1" => Ok(Units::Ch1),
            "pch" => Ok(Units::Pch),
            "pc1" => Ok(Units::Pc1),
            "pca" => Ok(Units::Pca),
            "cch" => Ok(Units::Cch),
            "cca" => Ok(Units::Cca),
            "log" => Ok(Units::Log),
            other => Err(FredQueryError::invalid(
                "units",
                format!("'{other}' is not one of lin|chg|ch1|pch|pc1|pca|cch|cca|log"),
            )),
        }
    }
}

/// FRED frequency aggregation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Daily
    Daily,
    /// Weekly
    Weekly,
    /// Biweekly
    Biweekly,
    /// Monthly
    Monthly,
    /// Quarterly
    Quarterly,
    /// Semiannual
    Semiannual,
    /// Annual
    Annual,
}

impl Frequency {
    /// Wire representation for FRED's `frequency` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "d",
            Frequency::Weekly => "w",
            Frequency::Biweekly => "bw",
            Frequency::Monthly => "m",
            Frequency::Quarterly => "q",
            Frequency::Semiannual => "sa",
            Frequency::Annual => "a",
        }
    }

    /// Parse a wire value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "d" => Ok(Frequency::Daily),
            "w" => Ok(Frequency::Weekly),
            "bw" => Ok(Frequency::Biweekly),
            "m" => Ok(Frequency::Monthly),
            "q" => Ok(Frequency::Quarterly),
            "sa" => Ok(Frequency::Semiannual),
            "a" => Ok(Frequency::Annual),
            other => Err(FredQueryError::invalid(
                "frequency",
                format!("'{other}' is not one of d|w|bw|m|q|sa|a"),
            )),
        }
    }
}

/// Aggregation method used when downsampling to a coarser frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
    /// Period average (FRED default)
    Average,
    /// Period sum
    Sum,
    /// End of period
    EndOfPeriod,
}

impl AggregationMethod {
    /// Wire representation for FRED's `aggregation_method` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Average => "avg",
            AggregationMethod::Sum => "sum",
            AggregationMethod::EndOfPeriod => "eop",
        }
    }

    /// Parse a wire value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "avg" => Ok(AggregationMethod::Average),
            "sum" => Ok(AggregationMethod::Sum),
            "eop" => Ok(AggregationMethod::EndOfPeriod),
            other => Err(FredQueryError::invalid(
                "aggregation_method",
                format!("'{other}' is not one of avg|sum|eop"),
            )),
        }
    }
}

/// Arguments for `get_fred_series_observations`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ObservationsArgs {
    /// FRED series id, e.g. `CPIAUCSL`
    pub series_id: String,
    /// Window start as `YYYY-MM-DD`
    #[serde(default)]
    pub observation_start: Option<String>,
    /// Window end as `YYYY-MM-DD`
    #[serde(default)]
    pub observation_end: Option<String>,
    /// Transformation: lin|chg|ch1|pch|pc1|pca|cch|cca|log
    #[serde(default)]
    pub units: Option<String>,
    /// Aggregate to a coarser frequency: d|w|bw|m|q|sa|a
    #[serde(default)]
    pub frequency: Option<String>,
    /// Aggregation method: avg|sum|eop
    #[serde(default)]
    pub aggregation_method: Option<String>,
    /// Maximum observations to return
    #[serde(default)]
    pub limit: Option<u64>,
}

fn validate(args: &ObservationsArgs) -> Result<()> {
    super::require_nonempty("series_id", &args.series_id)?;
    validate_date_range(
        "observation_start",
        args.observation_start.as_deref(),
        "observation_end",
        args.observation_end.as_deref(),
    )?;
    if let Some(units) = args.units.as_deref() {
        Units::parse(units)?;
    }
    if let Some(frequency) = args.frequency.as_deref() {
        Frequency::parse(frequency)?;
    }
    if let Some(method) = args.aggregation_method.as_deref() {
        AggregationMethod::parse(method)?;
        if args.frequency.is_none() {
            return Err(FredQueryError::invalid(
                "aggregation_method",
                "requires frequency to be set",
            ));
        }
    }
    Ok(())
}

/// Fetch observations for a series, optionally transformed and aggregated.
pub async fn get_fred_series_observations(
    ctx: &AppContext,
    args: ObservationsArgs,
) -> ToolResponse {
    let units = args.units.clone().unwrap_or_else(|| "lin".to_string());
    let mut metadata = echo_metadata(&[
        ("series_id", json!(args.series_id)),
        ("observation_start", json!(args.observation_start)),
        ("observation_end", json!(args.observation_end)),
        ("units", json!(units)),
        ("frequency", json!(args.frequency)),
        ("aggregation_method", json!(args.aggregation_method)),
    ]);

    if let Err(err) = validate(&args) {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("series_id", Some(args.series_id.clone())),
        ("observation_start", args.observation_start.clone()),
        ("observation_end", args.observation_end.clone()),
        ("units", Some(units.clone())),
        ("frequency", args.frequency.clone()),
        ("aggregation_method", args.aggregation_method.clone()),
        ("limit", args.limit.map(|l| l.to_string())),
        ("sort_order", Some("asc".to_string())),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/series/observations", &params, ns::OBSERVATIONS, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let observations: Vec<Value> = raw
                .get("observations")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .map(|obs| {
                            let value = obs
                                .get("value")
                                .and_then(|v| v.as_str())
                                .filter(|s| *s != ".")
                                .and_then(|s| s.parse::<f64>().ok());
                            json!({
                                "date": obs.get("date"),
                                "value": value,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            let data = json!({
                "series_id": args.series_id,
                "count": observations.len(),
                "observations": observations,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_round_trip() {
        for code in ["lin", "chg", "ch1", "pch", "pc1", "pca", "cch", "cca", "log"] {
            assert_eq!(Units::parse(code).unwrap().as_str(), code);
        }
        assert!(Units::parse("yoy").is_err());
    }

    #[test]
    fn test_frequency_round_trip() {
        for code in ["d", "w", "bw", "m", "q", "sa", "a"] {
            assert_eq!(Frequency::parse(code).unwrap().as_str(), code);
        }
        assert!(Frequency::parse("monthly").is_err());
    }

    #[test]
    fn test_aggregation_requires_frequency() {
        let args = ObservationsArgs {
            series_id: "GDP".to_string(),
            aggregation_method: Some("avg".to_string()),
            ..Default::default()
        };
        let err = validate(&args).unwrap_err();
        assert!(err.to_string().contains("aggregation_method"));
    }

    #[test]
    fn test_slash_date_rejected() {
        let args = ObservationsArgs {
            series_id: "GDP".to_string(),
            observation_start: Some("2020/01/01".to_string()),
            ..Default::default()
        };
        let err = validate(&args).unwrap_err();
        assert!(err.to_string().contains("observation_start"));
    }

    #[test]
    fn test_start_after_end_rejected() {
        let args = ObservationsArgs {
            series_id: "GDP".to_string(),
            observation_start: Some("2021-01-01".to_string()),
            observation_end: Some("2020-01-01".to_string()),
            ..Default::default()
        };
        assert!(validate(&args).is_err());
    }

    #[test]
    fn test_valid_args_pass() {
        let args = ObservationsArgs {
            series_id: "CPIAUCSL".to_string(),
            observation_start: Some("2020-01-01".to_string()),
            observation_end: Some("2020-06-01".to_string()),
            units: Some("pc1".to_string()),
            frequency: Some("m".to_string()),
            aggregation_method: Some("avg".to_string()),
            ..Default::default()
        };
        assert!(validate(&args).is_ok());
    }
}
