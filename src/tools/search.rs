//! Full-text and series-id search over FRED.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{clamp_limit, compact_series_list, require_nonempty, validate_enum, validate_tag_list};
use crate::AppContext;
use crate::cache::ns;
use crate::error::Result;
use crate::response::{ToolResponse, echo_metadata};

const TOOL: &str = "search_fred_series";

const ORDER_BY_VALUES: &[&str] = &[
    "search_rank",
    "series_id",
    "title",
    "units",
    "frequency",
    "seasonal_adjustment",
    "realtime_start",
    "realtime_end",
    "last_updated",
    "observation_start",
    "observation_end",
    "popularity",
    "group_popularity",
];

/// Arguments for `search_fred_series`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SearchSeriesArgs {
    /// Text to match against series titles, ids, and descriptions
    pub search_text: String,
    /// `full_text` (default) or `series_id`
    #[serde(default)]
    pub search_type: Option<String>,
    /// Maximum results (default 20, clamped to 1..=1000)
    #[serde(default)]
    pub limit: Option<u64>,
    /// Result offset for pagination
    #[serde(default)]
    pub offset: Option<u64>,
    /// Sort field, e.g. `search_rank` or `popularity`
    #[serde(default)]
    pub order_by: Option<String>,
    /// `asc` or `desc`
    #[serde(default)]
    pub sort_order: Option<String>,
    /// Attribute to filter on: `frequency`, `units`, or `seasonal_adjustment`
    #[serde(default)]
    pub filter_variable: Option<String>,
    /// Value for `filter_variable`
    #[serde(default)]
    pub filter_value: Option<String>,
    /// Semicolon-delimited tags every result must carry
    #[serde(default)]
    pub tag_names: Option<String>,
    /// Semicolon-delimited tags no result may carry
    #[serde(default)]
    pub exclude_tag_names: Option<String>,
}

fn validate(args: &SearchSeriesArgs) -> Result<()> {
    require_nonempty("search_text", &args.search_text)?;
    if let Some(search_type) = args.search_type.as_deref() {
        validate_enum("search_type", search_type, &["full_text", "series_id"])?;
    }
    if let Some(order_by) = args.order_by.as_deref() {
        validate_enum("order_by", order_by, ORDER_BY_VALUES)?;
    }
    if let Some(sort_order) = args.sort_order.as_deref() {
        validate_enum("sort_order", sort_order, &["asc", "desc"])?;
    }
    if let Some(filter_variable) = args.filter_variable.as_deref() {
        validate_enum(
            "filter_variable",
            filter_variable,
            &["frequency", "units", "seasonal_adjustment"],
        )?;
        if args.filter_value.as_deref().unwrap_or("").is_empty() {
            return Err(crate::error::FredQueryError::invalid(
                "filter_value",
                "required when filter_variable is set",
            ));
        }
    }
    if let Some(tags) = args.tag_names.as_deref() {
        validate_tag_list("tag_names", tags)?;
    }
    if let Some(tags) = args.exclude_tag_names.as_deref() {
        validate_tag_list("exclude_tag_names", tags)?;
    }
    Ok(())
}

/// Search FRED series by text or id.
pub async fn search_fred_series(ctx: &AppContext, args: SearchSeriesArgs) -> ToolResponse {
    let limit = clamp_limit(args.limit);
    let offset = args.offset.unwrap_or(0);
    let mut metadata = echo_metadata(&[
        ("search_text", json!(args.search_text)),
        ("search_type", json!(args.search_type)),
        ("limit", json!(limit)),
        ("offset", json!(offset)),
        ("order_by", json!(args.order_by)),
        ("sort_order", json!(args.sort_order)),
        ("tag_names", json!(args.tag_names)),
        ("exclude_tag_names", json!(args.exclude_tag_names)),
    ]);

    if let Err(err) = validate(&args) {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("search_text", Some(args.search_text.clone())),
        ("search_type", args.search_type.clone()),
        ("limit", Some(limit.to_string())),
        ("offset", Some(offset.to_string())),
        ("order_by", args.order_by.clone()),
        ("sort_order", args.sort_order.clone()),
        ("filter_variable", args.filter_variable.clone()),
        ("filter_value", args.filter_value.clone()),
        ("tag_names", args.tag_names.clone()),
        ("exclude_tag_names", args.exclude_tag_names.clone()),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/series/search", &params, ns::SEARCH, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let series = compact_series_list(&raw);
            let data: Value = json!({
                "count": raw.get("count").cloned().unwrap_or(json!(series.len())),
                "series": series,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}
