//! Tag discovery and filtering tools.
//!
//! Tag lists on the wire are semicolon-delimited (`"usa;cpi"`), matching
//! FRED's own convention.

use serde::Deserialize;
use serde_json::json;

use super::{
    clamp_limit, compact_series_list, compact_tag_list, require_nonempty, validate_enum,
    validate_tag_list,
};
use crate::AppContext;
use crate::cache::ns;
use crate::error::{FredQueryError, Result};
use crate::fred::TagGroup;
use crate::response::{ToolResponse, echo_metadata};

const TAG_ORDER_BY: &[&str] = &["series_count", "popularity", "created", "name", "group_id"];

fn validate_tag_group(value: Option<&str>) -> Result<()> {
    if let Some(group) = value {
        if TagGroup::parse(group).is_none() {
            return Err(FredQueryError::invalid(
                "tag_group_id",
                format!("'{group}' is not one of freq|gen|geo|geot|rls|seas|src|cc"),
            ));
        }
    }
    Ok(())
}

fn validate_tag_ordering(order_by: Option<&str>, sort_order: Option<&str>) -> Result<()> {
    if let Some(order_by) = order_by {
        validate_enum("order_by", order_by, TAG_ORDER_BY)?;
    }
    if let Some(sort_order) = sort_order {
        validate_enum("sort_order", sort_order, &["asc", "desc"])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// get_fred_series_tags
// ---------------------------------------------------------------------------

/// Arguments for `get_fred_series_tags`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SeriesTagsArgs {
    /// FRED series id
    pub series_id: String,
    /// Sort field for the returned tags
    #[serde(default)]
    pub order_by: Option<String>,
    /// `asc` or `desc`
    #[serde(default)]
    pub sort_order: Option<String>,
}

/// Tags attached to one series.
pub async fn get_fred_series_tags(ctx: &AppContext, args: SeriesTagsArgs) -> ToolResponse {
    const TOOL: &str = "get_fred_series_tags";
    let mut metadata = echo_metadata(&[
        ("series_id", json!(args.series_id)),
        ("order_by", json!(args.order_by)),
        ("sort_order", json!(args.sort_order)),
    ]);

    let validated = require_nonempty("series_id", &args.series_id)
        .and_then(|_| validate_tag_ordering(args.order_by.as_deref(), args.sort_order.as_deref()));
    if let Err(err) = validated {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("series_id", Some(args.series_id.clone())),
        ("order_by", args.order_by.clone()),
        ("sort_order", args.sort_order.clone()),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/series/tags", &params, ns::TAGS, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let tags = compact_tag_list(&raw);
            let data = json!({
                "series_id": args.series_id,
                "count": tags.len(),
                "tags": tags,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

// ---------------------------------------------------------------------------
// search_fred_series_tags
// ---------------------------------------------------------------------------

/// Arguments for `search_fred_series_tags`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SearchSeriesTagsArgs {
    /// Series search whose matching tags are returned
    pub series_search_text: String,
    /// Narrow the returned tags by name
    #[serde(default)]
    pub tag_search_text: Option<String>,
    /// Restrict to one tag group: freq|gen|geo|geot|rls|seas|src|cc
    #[serde(default)]
    pub tag_group_id: Option<String>,
    /// Maximum tags (default 20, clamped to 1..=1000)
    #[serde(default)]
    pub limit: Option<u64>,
    /// Sort field for the returned tags
    #[serde(default)]
    pub order_by: Option<String>,
    /// `asc` or `desc`
    #[serde(default)]
    pub sort_order: Option<String>,
}

/// Tags carried by the series matching a search.
pub async fn search_fred_series_tags(ctx: &AppContext, args: SearchSeriesTagsArgs) -> ToolResponse {
    const TOOL: &str = "search_fred_series_tags";
    let limit = clamp_limit(args.limit);
    let mut metadata = echo_metadata(&[
        ("series_search_text", json!(args.series_search_text)),
        ("tag_search_text", json!(args.tag_search_text)),
        ("tag_group_id", json!(args.tag_group_id)),
        ("limit", json!(limit)),
    ]);

    let validated = require_nonempty("series_search_text", &args.series_search_text)
        .and_then(|_| validate_tag_group(args.tag_group_id.as_deref()))
        .and_then(|_| validate_tag_ordering(args.order_by.as_deref(), args.sort_order.as_deref()));
    if let Err(err) = validated {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("series_search_text", Some(args.series_search_text.clone())),
        ("tag_search_text", args.tag_search_text.clone()),
        ("tag_group_id", args.tag_group_id.clone()),
        ("limit", Some(limit.to_string())),
        ("order_by", args.order_by.clone()),
        ("sort_order", args.sort_order.clone()),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/series/search/tags", &params, ns::TAGS, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let tags = compact_tag_list(&raw);
            let data = json!({
                "count": raw.get("count").cloned().unwrap_or(json!(tags.len())),
                "tags": tags,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

// ---------------------------------------------------------------------------
// search_fred_series_related_tags
// ---------------------------------------------------------------------------

/// Arguments for `search_fred_series_related_tags`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SearchSeriesRelatedTagsArgs {
    /// Series search to scope the co-occurrence analysis
    pub series_search_text: String,
    /// Semicolon-delimited tags the related tags must co-occur with
    pub tag_names: String,
    /// Semicolon-delimited tags to exclude
    #[serde(default)]
    pub exclude_tag_names: Option<String>,
    /// Maximum tags (default 20, clamped to 1..=1000)
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Tags related (by co-occurrence) to given tags within a series search.
pub async fn search_fred_series_related_tags(
    ctx: &AppContext,
    args: SearchSeriesRelatedTagsArgs,
) -> ToolResponse {
    const TOOL: &str = "search_fred_series_related_tags";
    let limit = clamp_limit(args.limit);
    let mut metadata = echo_metadata(&[
        ("series_search_text", json!(args.series_search_text)),
        ("tag_names", json!(args.tag_names)),
        ("exclude_tag_names", json!(args.exclude_tag_names)),
        ("limit", json!(limit)),
    ]);

    let validated = require_nonempty("series_search_text", &args.series_search_text)
        .and_then(|_| validate_tag_list("tag_names", &args.tag_names))
        .and_then(|_| match args.exclude_tag_names.as_deref() {
            Some(tags) => validate_tag_list("exclude_tag_names", tags),
            None => Ok(()),
        });
    if let Err(err) = validated {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("series_search_text", Some(args.series_search_text.clone())),
        ("tag_names", Some(args.tag_names.clone())),
        ("exclude_tag_names", args.exclude_tag_names.clone()),
        ("limit", Some(limit.to_string())),
    ];

    match ctx
        .client
        .get_json(
            TOOL,
            "fred/series/search/related_tags",
            &params,
            ns::TAGS,
            None,
        )
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let tags = compact_tag_list(&raw);
            let data = json!({
                "count": raw.get("count").cloned().unwrap_or(json!(tags.len())),
                "tags": tags,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

// ---------------------------------------------------------------------------
// get_fred_related_tags
// ---------------------------------------------------------------------------

/// Arguments for `get_fred_related_tags`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct RelatedTagsArgs {
    /// Semicolon-delimited tags the related tags must co-occur with
    pub tag_names: String,
    /// Semicolon-delimited tags to exclude
    #[serde(default)]
    pub exclude_tag_names: Option<String>,
    /// Restrict to one tag group: freq|gen|geo|geot|rls|seas|src|cc
    #[serde(default)]
    pub tag_group_id: Option<String>,
    /// Maximum tags (default 20, clamped to 1..=1000)
    #[serde(default)]
    pub limit: Option<u64>,
    /// Sort field for the returned tags
    #[serde(default)]
    pub order_by: Option<String>,
    /// `asc` or `desc`
    #[serde(default)]
    pub sort_order: Option<String>,
}

/// Tags that co-occur with the given tags across all of FRED.
pub async fn get_fred_related_tags(ctx: &AppContext, args: RelatedTagsArgs) -> ToolResponse {
    const TOOL: &str = "get_fred_related_tags";
    let limit = clamp_limit(args.limit);
    let mut metadata = echo_metadata(&[
        ("tag_names", json!(args.tag_names)),
        ("exclude_tag_names", json!(args.exclude_tag_names)),
        ("tag_group_id", json!(args.tag_group_id)),
        ("limit", json!(limit)),
    ]);

    let validated = validate_tag_list("tag_names", &args.tag_names)
        .and_then(|_| match args.exclude_tag_names.as_deref() {
            Some(tags) => validate_tag_list("exclude_tag_names", tags),
            None => Ok(()),
        })
        .and_then(|_| validate_tag_group(args.tag_group_id.as_deref()))
        .and_then(|_| validate_tag_ordering(args.order_by.as_deref(), args.sort_order.as_deref()));
    if let Err(err) = validated {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("tag_names", Some(args.tag_names.clone())),
        ("exclude_tag_names", args.exclude_tag_names.clone()),
        ("tag_group_id", args.tag_group_id.clone()),
        ("limit", Some(limit.to_string())),
        ("order_by", args.order_by.clone()),
        ("sort_order", args.sort_order.clone()),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/related_tags", &params, ns::TAGS, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let tags = compact_tag_list(&raw);
            let data = json!({
                "count": raw.get("count").cloned().unwrap_or(json!(tags.len())),
                "tags": tags,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

// ---------------------------------------------------------------------------
// get_fred_tags
// ---------------------------------------------------------------------------

/// Arguments for `get_fred_tags`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct TagsArgs {
    /// Narrow tags by name
    #[serde(default)]
    pub search_text: Option<String>,
    /// Semicolon-delimited tag names to look up directly
    #[serde(default)]
    pub tag_names: Option<String>,
    /// Restrict to one tag group: freq|gen|geo|geot|rls|seas|src|cc
    #[serde(default)]
    pub tag_group_id: Option<String>,
    /// Maximum tags (default 20, clamped to 1..=1000)
    #[serde(default)]
    pub limit: Option<u64>,
    /// Sort field for the returned tags
    #[serde(default)]
    pub order_by: Option<String>,
    /// `asc` or `desc`
    #[serde(default)]
    pub sort_order: Option<String>,
}

/// Browse or look up FRED tags.
pub async fn get_fred_tags(ctx: &AppContext, args: TagsArgs) -> ToolResponse {
    const TOOL: &str = "get_fred_tags";
    let limit = clamp_limit(args.limit);
    let mut metadata = echo_metadata(&[
        ("search_text", json!(args.search_text)),
        ("tag_names", json!(args.tag_names)),
        ("tag_group_id", json!(args.tag_group_id)),
        ("limit", json!(limit)),
        ("order_by", json!(args.order_by)),
        ("sort_order", json!(args.sort_order)),
    ]);

    let validated = validate_tag_group(args.tag_group_id.as_deref())
        .and_then(|_| match args.tag_names.as_deref() {
            Some(tags) => validate_tag_list("tag_names", tags),
            None => Ok(()),
        })
        .and_then(|_| validate_tag_ordering(args.order_by.as_deref(), args.sort_order.as_deref()));
    if let Err(err) = validated {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("search_text", args.search_text.clone()),
        ("tag_names", args.tag_names.clone()),
        ("tag_group_id", args.tag_group_id.clone()),
        ("limit", Some(limit.to_string())),
        ("order_by", args.order_by.clone()),
        ("sort_order", args.sort_order.clone()),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/tags", &params, ns::TAGS, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let tags = compact_tag_list(&raw);
            let data = json!({
                "count": raw.get("count").cloned().unwrap_or(json!(tags.len())),
                "tags": tags,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

// ---------------------------------------------------------------------------
// get_fred_series_by_tags
// ---------------------------------------------------------------------------

/// Arguments for `get_fred_series_by_tags`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SeriesByTagsArgs {
    /// Semicolon-delimited tags every series must carry
    pub tag_names: String,
    /// Semicolon-delimited tags no series may carry
    #[serde(default)]
    pub exclude_tag_names: Option<String>,
    /// Maximum series (default 20, clamped to 1..=1000)
    #[serde(default)]
    pub limit: Option<u64>,
    /// Sort field for the returned series
    #[serde(default)]
    pub order_by: Option<String>,
    /// `asc` or `desc`
    #[serde(default)]
    pub sort_order: Option<String>,
}

const SERIES_ORDER_BY: &[&str] = &[
    "series_id",
    "title",
    "units",
    "frequency",
    "seasonal_adjustment",
    "last_updated",
    "observation_start",
    "observation_end",
    "popularity",
    "group_popularity",
];

/// Series matching a tag filter.
pub async fn get_fred_series_by_tags(ctx: &AppContext, args: SeriesByTagsArgs) -> ToolResponse {
    const TOOL: &str = "get_fred_series_by_tags";
    let limit = clamp_limit(args.limit);
    let mut metadata = echo_metadata(&[
        ("tag_names", json!(args.tag_names)),
        ("exclude_tag_names", json!(args.exclude_tag_names)),
        ("limit", json!(limit)),
        ("order_by", json!(args.order_by)),
        ("sort_order", json!(args.sort_order)),
    ]);

    let validated = validate_tag_list("tag_names", &args.tag_names)
        .and_then(|_| match args.exclude_tag_names.as_deref() {
            Some(tags) => validate_tag_list("exclude_tag_names", tags),
            None => Ok(()),
        })
        .and_then(|_| match args.order_by.as_deref() {
            Some(order_by) => validate_enum("order_by", order_by, SERIES_ORDER_BY),
            None => Ok(()),
        })
        .and_then(|_| match args.sort_order.as_deref() {
            Some(sort_order) => validate_enum("sort_order", sort_order, &["asc", "desc"]),
            None => Ok(()),
        });
    if let Err(err) = validated {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> = vec![
        ("tag_names", Some(args.tag_names.clone())),
        ("exclude_tag_names", args.exclude_tag_names.clone()),
        ("limit", Some(limit.to_string())),
        ("order_by", args.order_by.clone()),
        ("sort_order", args.sort_order.clone()),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/tags/series", &params, ns::TAGS, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let series = compact_series_list(&raw);
            let data = json!({
                "count": raw.get("count").cloned().unwrap_or(json!(series.len())),
                "series": series,
            });
            ToolResponse::success(TOOL, data, metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}
