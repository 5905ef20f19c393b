//! Cross-country GDP analysis.
//!
//! Pipeline: VALIDATE → FETCH → DERIVE → ALIGN → ANALYZE → FORMAT. Every
//! phase can short-circuit into an error envelope; per-country failures are
//! tolerated and reported unless nothing at all was fetched.

use std::collections::BTreeMap;

use futures::StreamExt;
use serde_json::{Map, Value, json};

use super::countries::{self, GdpVariant};
use super::{AlignMethod, FillMissing, fill_gaps, inner_join, outer_join, stats};
use crate::AppContext;
use crate::error::{FredQueryError, Result};
use crate::response::{ToolResponse, echo_metadata};

const TOOL: &str = "analyze_gdp_cross_country";

/// Rolling window for structural-break detection, in observations
const BREAK_WINDOW: usize = 12;

/// Convergence preconditions
const MIN_CONVERGENCE_COUNTRIES: usize = 3;
const MIN_CONVERGENCE_OBSERVATIONS: usize = 5;

/// Presentation transform applied to the dataset view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Raw levels of the primary variant
    Absolute,
    /// Each country normalized to 100 at the base year
    Indexed,
    /// Per-capita variant passthrough
    PerCapita,
    /// Year-over-year growth passthrough
    GrowthRates,
    /// PPP variant passthrough
    Ppp,
    /// Ratio to a benchmark country
    RelativeToBenchmark,
}

impl ComparisonMode {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "absolute" => Ok(ComparisonMode::Absolute),
            "indexed" => Ok(ComparisonMode::Indexed),
            "per_capita" => Ok(ComparisonMode::PerCapita),
            "growth_rates" => Ok(ComparisonMode::GrowthRates),
            "ppp" => Ok(ComparisonMode::Ppp),
            "relative_to_benchmark" => Ok(ComparisonMode::RelativeToBenchmark),
            other => Err(FredQueryError::invalid(
                "comparison_mode",
                format!(
                    "'{other}' is not one of absolute|indexed|per_capita|growth_rates|ppp|\
                     relative_to_benchmark"
                ),
            )),
        }
    }
}

/// Which views the response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Statistical analysis only
    Analysis,
    /// Aligned time series only
    Dataset,
    /// Compact summary only
    Summary,
    /// Analysis plus dataset
    Both,
}

impl OutputFormat {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "analysis" => Ok(OutputFormat::Analysis),
            "dataset" => Ok(OutputFormat::Dataset),
            "summary" => Ok(OutputFormat::Summary),
            "both" => Ok(OutputFormat::Both),
            other => Err(FredQueryError::invalid(
                "output_format",
                format!("'{other}' is not one of analysis|dataset|summary|both"),
            )),
        }
    }
}

/// Arguments for `analyze_gdp_cross_country`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct GdpArgs {
    /// Comma-delimited ISO codes and/or presets (`g7`, `g20`, `brics`,
    /// `oecd`, `latam`, `eurozone_core`, `eurozone_periphery`, `nordic`,
    /// `north_america`, `asia_pacific`, `east_asia`, `southeast_asia`,
    /// `middle_east`, `africa`, `emerging`, `developed`)
    pub countries: String,
    /// Variants to analyze (default `["per_capita_constant"]`)
    #[serde(default)]
    pub gdp_variants: Option<Vec<String>>,
    /// Window start as `YYYY-MM-DD` (default `1960-01-01`)
    #[serde(default)]
    pub start_date: Option<String>,
    /// Window end as `YYYY-MM-DD`
    #[serde(default)]
    pub end_date: Option<String>,
    /// Presentation transform (default `absolute`)
    #[serde(default)]
    pub comparison_mode: Option<String>,
    /// Base year for `indexed` mode
    #[serde(default)]
    pub base_year: Option<i32>,
    /// Fetch population alongside GDP (default true)
    #[serde(default)]
    pub include_population: Option<bool>,
    /// Emit rankings (default true)
    #[serde(default)]
    pub include_rankings: Option<bool>,
    /// Emit sigma/beta convergence (default true)
    #[serde(default)]
    pub include_convergence: Option<bool>,
    /// Emit per-country growth metrics (default true)
    #[serde(default)]
    pub include_growth_analysis: Option<bool>,
    /// Detect variance regime shifts (default true)
    #[serde(default)]
    pub detect_structural_breaks: Option<bool>,
    /// Response views: analysis|dataset|summary|both (default analysis)
    #[serde(default)]
    pub output_format: Option<String>,
    /// Observation frequency; only `annual` is supported
    #[serde(default)]
    pub frequency: Option<String>,
    /// Gap policy after an outer join: interpolate|forward|drop
    /// (default interpolate)
    #[serde(default)]
    pub fill_missing: Option<String>,
    /// Date alignment: inner|outer (default inner)
    #[serde(default)]
    pub align_method: Option<String>,
    /// Benchmark country code for `relative_to_benchmark` mode
    #[serde(default)]
    pub benchmark_against: Option<String>,
}

/// Analyze GDP across countries.
pub async fn analyze_gdp_cross_country(ctx: &AppContext, args: GdpArgs) -> ToolResponse {
    let mut metadata = echo_metadata(&[
        ("countries", json!(args.countries)),
        ("gdp_variants", json!(args.gdp_variants)),
        ("start_date", json!(args.start_date.clone().unwrap_or_else(|| "1960-01-01".to_string()))),
        ("end_date", json!(args.end_date)),
        ("comparison_mode", json!(args.comparison_mode)),
        ("base_year", json!(args.base_year)),
        ("output_format", json!(args.output_format)),
        ("align_method", json!(args.align_method)),
        ("fill_missing", json!(args.fill_missing)),
        ("benchmark_against", json!(args.benchmark_against)),
    ]);

    match run(ctx, &args).await {
        Ok((data, series_used)) => {
            metadata.insert("series_used".to_string(), series_used);
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

struct Plan {
    codes: Vec<&'static str>,
    variants: Vec<GdpVariant>,
    fetch_variants: Vec<GdpVariant>,
    start_date: String,
    end_date: Option<String>,
    mode: ComparisonMode,
    format: OutputFormat,
    align: AlignMethod,
    fill: FillMissing,
    base_year: Option<i32>,
    benchmark: Option<String>,
    include_rankings: bool,
    include_convergence: bool,
    include_growth: bool,
    detect_breaks: bool,
    warnings: Vec<String>,
}

fn validate(ctx: &AppContext, args: &GdpArgs) -> Result<Plan> {
    let start_date = args
        .start_date
        .clone()
        .unwrap_or_else(|| "1960-01-01".to_string());
    crate::tools::validate_date("start_date", &start_date)?;
    if let Some(end) = args.end_date.as_deref() {
        crate::tools::validate_date("end_date", end)?;
        crate::tools::validate_date_range(
            "start_date",
            Some(start_date.as_str()),
            "end_date",
            Some(end),
        )?;
    }
    if let Some(frequency) = args.frequency.as_deref() {
        crate::tools::validate_enum("frequency", frequency, &["annual", "a"])?;
    }

    let mode = ComparisonMode::parse(args.comparison_mode.as_deref().unwrap_or("absolute"))?;
    let format = OutputFormat::parse(args.output_format.as_deref().unwrap_or("analysis"))?;
    let align = AlignMethod::parse(args.align_method.as_deref().unwrap_or("inner"))?;
    let fill = FillMissing::parse(args.fill_missing.as_deref().unwrap_or("interpolate"))?;

    if mode == ComparisonMode::Indexed && args.base_year.is_none() {
        return Err(FredQueryError::invalid(
            "base_year",
            "required for comparison_mode=indexed",
        ));
    }

    if args.countries.trim().is_empty() {
        return Err(FredQueryError::invalid("countries", "must not be empty"));
    }
    let inputs: Vec<String> = args
        .countries
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();
    let (mut codes, mut warnings) = countries::expand_countries(&inputs);
    let cap = ctx.config.gdp_max_countries;
    if codes.len() > cap {
        warnings.push(format!(
            "{} countries requested, clamped to the configured maximum of {cap}: dropped {}",
            codes.len(),
            codes[cap..].join(", ")
        ));
        codes.truncate(cap);
    }
    if codes.is_empty() {
        return Err(FredQueryError::invalid(
            "countries",
            "no known countries after expansion",
        ));
    }

    let benchmark = match (mode, args.benchmark_against.as_deref()) {
        (ComparisonMode::RelativeToBenchmark, None) => {
            return Err(FredQueryError::invalid(
                "benchmark_against",
                "required for comparison_mode=relative_to_benchmark",
            ));
        }
        (ComparisonMode::RelativeToBenchmark, Some(code)) => {
            let country = countries::lookup(code).ok_or_else(|| {
                FredQueryError::invalid("benchmark_against", format!("unknown country '{code}'"))
            })?;
            if !codes.contains(&country.code) {
                codes.push(country.code);
            }
            Some(country.code.to_string())
        }
        (_, other) => other.map(String::from),
    };

    let mut variants: Vec<GdpVariant> = Vec::new();
    for raw in args
        .gdp_variants
        .clone()
        .unwrap_or_else(|| vec!["per_capita_constant".to_string()])
    {
        let variant = GdpVariant::parse(&raw)?;
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    if variants.is_empty() {
        variants.push(GdpVariant::PerCapitaConstant);
    }

    // Variant planning: direct fetches plus the dependencies of derivations
    let mut fetch_variants: Vec<GdpVariant> = Vec::new();
    let need = |v: GdpVariant, set: &mut Vec<GdpVariant>| {
        if !set.contains(&v) {
            set.push(v);
        }
    };
    let mut needs_population = args.include_population.unwrap_or(true);
    for variant in &variants {
        match variant {
            GdpVariant::GrowthRate => need(GdpVariant::Constant2010, &mut fetch_variants),
            v => {
                need(*v, &mut fetch_variants);
                if let Some(total) = v.per_capita_source() {
                    // Fallback path when the direct per-capita series is missing
                    need(total, &mut fetch_variants);
                    needs_population = true;
                }
            }
        }
    }
    if needs_population {
        need(GdpVariant::Population, &mut fetch_variants);
    }

    Ok(Plan {
        codes,
        variants,
        fetch_variants,
        start_date,
        end_date: args.end_date.clone(),
        mode,
        format,
        align,
        fill,
        base_year: args.base_year,
        benchmark,
        include_rankings: args.include_rankings.unwrap_or(true),
        include_convergence: args.include_convergence.unwrap_or(true),
        include_growth: args.include_growth_analysis.unwrap_or(true),
        detect_breaks: args.detect_structural_breaks.unwrap_or(true),
        warnings,
    })
}

type DatedSeries = Vec<(String, f64)>;
type CountryData = BTreeMap<String, BTreeMap<GdpVariant, DatedSeries>>;

async fn run(ctx: &AppContext, args: &GdpArgs) -> Result<(Value, Value)> {
    let mut plan = validate(ctx, args)?;

    // FETCH: every (country, variant) pair through the shared client
    let pairs: Vec<(&'static str, GdpVariant, String)> = plan
        .codes
        .iter()
        .flat_map(|code| {
            plan.fetch_variants.iter().filter_map(move |variant| {
                variant
                    .series_id(code)
                    .map(|series_id| (*code, *variant, series_id))
            })
        })
        .collect();

    let fetches = futures::stream::iter(pairs.into_iter().map(|(code, variant, series_id)| {
        let client = &ctx.client;
        let start = plan.start_date.clone();
        let end = plan.end_date.clone();
        async move {
            let result = client
                .observations(TOOL, &series_id, Some(&start), end.as_deref(), None, None)
                .await;
            (code, variant, series_id, result)
        }
    }))
    .buffer_unordered(ctx.config.gdp_fanout.max(1))
    .collect::<Vec<_>>()
    .await;

    let mut data: CountryData = BTreeMap::new();
    let mut series_used: Vec<Value> = Vec::new();
    let mut diagnostics = Vec::new();
    for (code, variant, series_id, result) in fetches {
        match result {
            Ok(series) => {
                let present: DatedSeries = series
                    .observations
                    .iter()
                    .filter_map(|o| o.value.map(|v| (o.date.clone(), v)))
                    .collect();
                if present.is_empty() {
                    diagnostics.push(format!("{code}/{}: empty", variant.as_str()));
                } else {
                    series_used.push(json!({
                        "country": code,
                        "variant": variant.as_str(),
                        "series_id": series_id,
                    }));
                    data.entry(code.to_string()).or_default().insert(variant, present);
                }
            }
            Err(e) => {
                diagnostics.push(format!("{code}/{}: {e}", variant.as_str()));
            }
        }
    }
    for diagnostic in &diagnostics {
        plan.warnings.push(format!("fetch failed: {diagnostic}"));
    }
    if data.is_empty() {
        return Err(FredQueryError::NoDataFetched { diagnostics });
    }

    // DERIVE: growth rates and per-capita fallbacks
    derive_variants(&mut data, &plan);

    // Countries missing the primary variant drop out of the analysis
    let primary = plan.variants[0];
    let primary_series: BTreeMap<String, DatedSeries> = data
        .iter()
        .filter_map(|(code, variants)| {
            variants.get(&primary).map(|s| (code.clone(), s.clone()))
        })
        .collect();
    for code in data.keys() {
        if !primary_series.contains_key(code) {
            plan.warnings.push(format!(
                "country '{code}' has no '{}' data in the window",
                primary.as_str()
            ));
        }
    }
    if primary_series.is_empty() {
        return Err(FredQueryError::NoDataFetched {
            diagnostics: vec![format!("no country produced '{}' data", primary.as_str())],
        });
    }

    // ALIGN
    let (dates, aligned) = align(&primary_series, plan.align, plan.fill);
    if dates.is_empty() {
        return Err(FredQueryError::NoCommonDates {
            context: "alignment left no overlapping observation dates".to_string(),
        });
    }

    // ANALYZE
    let analysis = analyze(&plan, &dates, &aligned);

    // FORMAT
    let mut body = Map::new();
    match plan.format {
        OutputFormat::Analysis => {
            body.insert("analysis".to_string(), analysis);
        }
        OutputFormat::Dataset => {
            body.insert(
                "dataset".to_string(),
                dataset_view(&plan, &dates, &aligned, &data)?,
            );
        }
        OutputFormat::Summary => {
            body.insert("summary".to_string(), summary_view(&analysis));
        }
        OutputFormat::Both => {
            body.insert(
                "dataset".to_string(),
                dataset_view(&plan, &dates, &aligned, &data)?,
            );
            body.insert("analysis".to_string(), analysis);
        }
    }
    body.insert("warnings".to_string(), json!(plan.warnings));
    body.insert(
        "countries_analyzed".to_string(),
        json!(aligned.keys().collect::<Vec<_>>()),
    );
    body.insert("aligned_observations".to_string(), json!(dates.len()));

    Ok((Value::Object(body), Value::Array(series_used)))
}

fn derive_variants(data: &mut CountryData, plan: &Plan) {
    for variants in data.values_mut() {
        // growth_rate from constant-dollar levels; the first output point
        // lands on the second input date
        if plan.variants.contains(&GdpVariant::GrowthRate) {
            if let Some(levels) = variants.get(&GdpVariant::Constant2010) {
                let values: Vec<f64> = levels.iter().map(|(_, v)| *v).collect();
                let growth = stats::growth_rates(&values);
                let derived: DatedSeries = levels
                    .iter()
                    .skip(1)
                    .zip(growth.into_iter())
                    .filter(|(_, g)| g.is_finite())
                    .map(|((date, _), g)| (date.clone(), g))
                    .collect();
                if !derived.is_empty() {
                    variants.insert(GdpVariant::GrowthRate, derived);
                }
            }
        }

        // per-capita fallback: total / population on common dates
        for variant in &plan.variants {
            let Some(total_variant) = variant.per_capita_source() else {
                continue;
            };
            if variants.contains_key(variant) {
                continue;
            }
            let (Some(total), Some(population)) = (
                variants.get(&total_variant),
                variants.get(&GdpVariant::Population),
            ) else {
                continue;
            };
            let population_by_date: BTreeMap<&str, f64> = population
                .iter()
                .map(|(d, v)| (d.as_str(), *v))
                .collect();
            let scale = total_variant.value_scale();
            let derived: DatedSeries = total
                .iter()
                .filter_map(|(date, v)| {
                    population_by_date
                        .get(date.as_str())
                        .filter(|pop| **pop > 0.0)
                        .map(|pop| (date.clone(), v * scale / pop))
                })
                .collect();
            if !derived.is_empty() {
                variants.insert(*variant, derived);
            }
        }
    }
}

fn align(
    series: &BTreeMap<String, DatedSeries>,
    method: AlignMethod,
    fill: FillMissing,
) -> (Vec<String>, BTreeMap<String, Vec<Option<f64>>>) {
    match method {
        AlignMethod::Inner => {
            let (dates, aligned) = inner_join(series);
            let lifted = aligned
                .into_iter()
                .map(|(code, values)| (code, values.into_iter().map(Some).collect()))
                .collect();
            (dates, lifted)
        }
        AlignMethod::Outer => {
            let (dates, mut aligned) = outer_join(series);
            for values in aligned.values_mut() {
                fill_gaps(values, fill);
            }
            (dates, aligned)
        }
    }
}

/// Effective (date, value) pairs for one country within the aligned window.
fn present(dates: &[String], values: &[Option<f64>]) -> DatedSeries {
    dates
        .iter()
        .zip(values.iter())
        .filter_map(|(d, v)| v.map(|v| (d.clone(), v)))
        .collect()
}

fn year_of(date: &str) -> Option<i32> {
    date.get(0..4)?.parse().ok()
}

fn country_metrics(plan: &Plan, dates: &[String], values: &[Option<f64>]) -> Value {
    let series = present(dates, values);
    if series.is_empty() {
        return json!({"observations": 0});
    }
    let raw: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let (first_date, first_value) = series.first().cloned().unwrap();
    let (last_date, last_value) = series.last().cloned().unwrap();

    let years = match (year_of(&first_date), year_of(&last_date)) {
        (Some(a), Some(b)) if b > a => (b - a) as f64,
        _ => (series.len().max(2) - 1) as f64,
    };

    let mut metrics = Map::new();
    metrics.insert("observations".to_string(), json!(series.len()));
    metrics.insert("first_date".to_string(), json!(first_date));
    metrics.insert("last_date".to_string(), json!(last_date));
    metrics.insert("latest".to_string(), json!(last_value));
    metrics.insert(
        "min".to_string(),
        json!(raw.iter().cloned().fold(f64::INFINITY, f64::min)),
    );
    metrics.insert(
        "max".to_string(),
        json!(raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
    );
    metrics.insert("mean".to_string(), json!(stats::mean(&raw)));

    if plan.include_growth {
        metrics.insert(
            "cagr".to_string(),
            json!(stats::cagr(first_value, last_value, years)),
        );
        metrics.insert("volatility".to_string(), json!(stats::volatility(&raw)));
        metrics.insert(
            "stability_index".to_string(),
            json!(stats::stability_index(&raw)),
        );
    }

    if plan.detect_breaks {
        let growth = stats::growth_rates(&raw);
        let growth_dates: Vec<String> = series.iter().skip(1).map(|(d, _)| d.clone()).collect();
        let finite: Vec<(String, f64)> = growth_dates
            .into_iter()
            .zip(growth.into_iter())
            .filter(|(_, g)| g.is_finite())
            .collect();
        let (bd, bv): (Vec<String>, Vec<f64>) = finite.into_iter().unzip();
        let breaks = stats::detect_structural_breaks(&bd, &bv, BREAK_WINDOW);
        metrics.insert(
            "structural_breaks".to_string(),
            serde_json::to_value(&breaks).unwrap_or(Value::Null),
        );
    }

    Value::Object(metrics)
}

fn analyze(
    plan: &Plan,
    dates: &[String],
    aligned: &BTreeMap<String, Vec<Option<f64>>>,
) -> Value {
    let mut per_country = Map::new();
    for (code, values) in aligned {
        per_country.insert(code.clone(), country_metrics(plan, dates, values));
    }

    // Latest-date dispersion across countries
    let last = dates.len() - 1;
    let latest: Vec<f64> = aligned.values().filter_map(|v| v[last]).collect();
    let dispersion = if latest.len() >= 2 {
        json!({
            "date": dates[last],
            "mean": stats::mean(&latest),
            "median": stats::median(&latest),
            "std": stats::std_dev(&latest),
            "cv": stats::coefficient_of_variation(&latest),
            "min": latest.iter().cloned().fold(f64::INFINITY, f64::min),
            "max": latest.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        })
    } else {
        json!({"note": "dispersion requires at least 2 countries at the latest date"})
    };

    let mut analysis = Map::new();
    analysis.insert("per_country".to_string(), Value::Object(per_country.clone()));
    analysis.insert("dispersion".to_string(), dispersion);

    if plan.include_convergence {
        analysis.insert(
            "convergence".to_string(),
            convergence(dates, aligned),
        );
    }

    if plan.include_rankings {
        analysis.insert("rankings".to_string(), rankings(&per_country));
    }

    Value::Object(analysis)
}

fn convergence(dates: &[String], aligned: &BTreeMap<String, Vec<Option<f64>>>) -> Value {
    let overlapping: usize = (0..dates.len())
        .filter(|&i| aligned.values().all(|v| v[i].is_some()))
        .count();
    if aligned.len() < MIN_CONVERGENCE_COUNTRIES || overlapping < MIN_CONVERGENCE_OBSERVATIONS {
        return json!({
            "sigma": null,
            "beta": null,
            "note": "Insufficient overlapping data",
        });
    }

    // Sigma: cross-sectional CV at each fully-observed date, regressed on time
    let mut cv_x = Vec::new();
    let mut cv_y = Vec::new();
    for (i, _date) in dates.iter().enumerate() {
        let at_date: Vec<f64> = aligned.values().filter_map(|v| v[i]).collect();
        if at_date.len() == aligned.len() {
            if let Some(cv) = stats::coefficient_of_variation(&at_date) {
                cv_x.push(cv_x.len() as f64);
                cv_y.push(cv);
            }
        }
    }
    let sigma = match stats::linear_regression(&cv_x, &cv_y) {
        Some(fit) => {
            let direction = if fit.p_value < 0.05 && fit.slope < 0.0 {
                "converging"
            } else if fit.p_value < 0.05 && fit.slope > 0.0 {
                "diverging"
            } else {
                "stable"
            };
            json!({
                "slope": fit.slope,
                "r_squared": fit.r_squared,
                "p_value": fit.p_value,
                "direction": direction,
            })
        }
        None => Value::Null,
    };

    // Beta: per-country CAGR on log(initial level)
    let mut log_initial = Vec::new();
    let mut cagrs = Vec::new();
    for values in aligned.values() {
        let series = present(dates, values);
        if series.len() < 2 {
            continue;
        }
        let (first_date, first_value) = series.first().cloned().unwrap();
        let (last_date, last_value) = series.last().cloned().unwrap();
        let years = match (year_of(&first_date), year_of(&last_date)) {
            (Some(a), Some(b)) if b > a => (b - a) as f64,
            _ => (series.len() - 1) as f64,
        };
        if first_value > 0.0 {
            if let Some(g) = stats::cagr(first_value, last_value, years) {
                log_initial.push(first_value.ln());
                cagrs.push(g);
            }
        }
    }
    let beta = match stats::linear_regression(&log_initial, &cagrs) {
        Some(fit) => {
            let significant = fit.p_value < 0.05;
            let interpretation = if significant && fit.slope < 0.0 {
                "catch-up growth"
            } else if significant && fit.slope > 0.0 {
                "rich grow faster"
            } else {
                "none"
            };
            json!({
                "coefficient": fit.slope,
                "r_squared": fit.r_squared,
                "p_value": fit.p_value,
                "significant": significant,
                "interpretation": interpretation,
            })
        }
        None => Value::Null,
    };

    json!({"sigma": sigma, "beta": beta})
}

fn rankings(per_country: &Map<String, Value>) -> Value {
    let rank_desc = |key: &str| -> Vec<Value> {
        let mut entries: Vec<(&String, f64)> = per_country
            .iter()
            .filter_map(|(code, metrics)| {
                metrics.get(key).and_then(|v| v.as_f64()).map(|v| (code, v))
            })
            .collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (code, value))| json!({"rank": i + 1, "country": code, "value": value}))
            .collect()
    };

    json!({
        "by_latest_level": rank_desc("latest"),
        "by_cagr": rank_desc("cagr"),
        "by_stability": rank_desc("stability_index"),
    })
}

fn dataset_view(
    plan: &Plan,
    dates: &[String],
    aligned: &BTreeMap<String, Vec<Option<f64>>>,
    data: &CountryData,
) -> Result<Value> {
    let mut series: BTreeMap<String, Vec<Option<f64>>> = match plan.mode {
        ComparisonMode::Absolute => aligned.clone(),
        ComparisonMode::PerCapita | ComparisonMode::GrowthRates | ComparisonMode::Ppp => {
            // Passthrough of the mode's variant, aligned to the same dates
            let variant = match plan.mode {
                ComparisonMode::PerCapita => GdpVariant::PerCapitaConstant,
                ComparisonMode::GrowthRates => GdpVariant::GrowthRate,
                _ => GdpVariant::PppAdjusted,
            };
            let mut out = BTreeMap::new();
            for code in aligned.keys() {
                let by_date: BTreeMap<&str, f64> = data
                    .get(code)
                    .and_then(|v| v.get(&variant))
                    .map(|s| s.iter().map(|(d, v)| (d.as_str(), *v)).collect())
                    .unwrap_or_default();
                out.insert(
                    code.clone(),
                    dates.iter().map(|d| by_date.get(d.as_str()).copied()).collect(),
                );
            }
            out
        }
        ComparisonMode::Indexed => {
            let base_year = plan.base_year.expect("validated for indexed mode");
            let base_index = dates
                .iter()
                .position(|d| year_of(d) == Some(base_year))
                .ok_or_else(|| {
                    FredQueryError::invalid(
                        "base_year",
                        format!("{base_year} is outside the aligned window"),
                    )
                })?;
            aligned
                .iter()
                .map(|(code, values)| {
                    let base = values[base_index];
                    let indexed: Vec<Option<f64>> = match base {
                        Some(base) if base != 0.0 => values
                            .iter()
                            .map(|v| v.map(|v| v / base * 100.0))
                            .collect(),
                        _ => vec![None; values.len()],
                    };
                    (code.clone(), indexed)
                })
                .collect()
        }
        ComparisonMode::RelativeToBenchmark => {
            let benchmark = plan
                .benchmark
                .as_deref()
                .expect("validated for relative_to_benchmark mode");
            let benchmark_values = aligned.get(benchmark).ok_or_else(|| {
                FredQueryError::invalid(
                    "benchmark_against",
                    format!("benchmark '{benchmark}' has no aligned data"),
                )
            })?;
            aligned
                .iter()
                .map(|(code, values)| {
                    let relative: Vec<Option<f64>> = values
                        .iter()
                        .zip(benchmark_values.iter())
                        .map(|(v, b)| match (v, b) {
                            (Some(v), Some(b)) if *b != 0.0 => Some(v / b),
                            _ => None,
                        })
                        .collect();
                    (code.clone(), relative)
                })
                .collect()
        }
    };

    // Population is reported alongside, never transformed
    if plan.fetch_variants.contains(&GdpVariant::Population)
        && plan.mode == ComparisonMode::Absolute
    {
        for (code, variants) in data {
            if let Some(population) = variants.get(&GdpVariant::Population) {
                let by_date: BTreeMap<&str, f64> =
                    population.iter().map(|(d, v)| (d.as_str(), *v)).collect();
                series.insert(
                    format!("{code}:population"),
                    dates.iter().map(|d| by_date.get(d.as_str()).copied()).collect(),
                );
            }
        }
    }

    let table: Map<String, Value> = series
        .into_iter()
        .map(|(code, values)| {
            let points: Vec<Value> = dates
                .iter()
                .zip(values.iter())
                .filter_map(|(d, v)| v.map(|v| json!({"date": d, "value": v})))
                .collect();
            (code, Value::Array(points))
        })
        .collect();

    Ok(json!({
        "variant": plan.variants[0].as_str(),
        "dates": dates,
        "series": table,
    }))
}

fn summary_view(analysis: &Value) -> Value {
    json!({
        "dispersion": analysis.get("dispersion"),
        "convergence": analysis.get("convergence"),
        "top_by_cagr": analysis
            .pointer("/rankings/by_cagr")
            .and_then(|v| v.as_array())
            .map(|v| v.iter().take(3).cloned().collect::<Vec<_>>()),
    })
}
