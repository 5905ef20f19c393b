//! Category tree navigation. Categories form a tree rooted at id 0.

use serde::Deserialize;
use serde_json::json;

use super::{clamp_limit, compact_series_list, validate_enum};
use crate::AppContext;
use crate::cache::ns;
use crate::error::{FredQueryError, Result};
use crate::response::{ToolResponse, echo_metadata};

fn validate_category_id(id: i64) -> Result<()> {
    if id < 0 {
        Err(FredQueryError::invalid(
            "category_id",
            "must be non-negative (the root category is 0)",
        ))
    } else {
        Ok(())
    }
}

/// Arguments for `get_fred_category` and `get_fred_category_children`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct CategoryArgs {
    /// Category id; 0 is the root
    #[serde(default)]
    pub category_id: i64,
}

/// Fetch one category node.
pub async fn get_fred_category(ctx: &AppContext, args: CategoryArgs) -> ToolResponse {
    const TOOL: &str = "get_fred_category";
    let mut metadata = echo_metadata(&[("category_id", json!(args.category_id))]);

    if let Err(err) = validate_category_id(args.category_id) {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> =
        vec![("category_id", Some(args.category_id.to_string()))];

    match ctx
        .client
        .get_json(TOOL, "fred/category", &params, ns::CATEGORIES, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let categories = raw
                .get("categories")
                .cloned()
                .unwrap_or_else(|| json!([]));
            ToolResponse::success(TOOL, json!({ "categories": categories }), metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

/// Fetch the child categories of a node.
pub async fn get_fred_category_children(ctx: &AppContext, args: CategoryArgs) -> ToolResponse {
    const TOOL: &str = "get_fred_category_children";
    let mut metadata = echo_metadata(&[("category_id", json!(args.category_id))]);

    if let Err(err) = validate_category_id(args.category_id) {
        return ToolResponse::failure(TOOL, &err, metadata);
    }

    let params: Vec<(&str, Option<String>)> =
        vec![("category_id", Some(args.category_id.to_string()))];

    match ctx
        .client
        .get_json(TOOL, "fred/category/children", &params, ns::CATEGORIES, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let categories = raw
                .get("categories")
                .cloned()
                .unwrap_or_else(|| json!([]));
            ToolResponse::success(TOOL, json!({ "categories": categories }), metadata)
        }
        Err(err) => ToolResponse::failure(TOOL, &err, metadata),
    }
}

/// Arguments for `get_fred_category_series`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct CategorySeriesArgs {
    /// Category id; 0 is the root
    #[serde(default)]
    pub category_id: i64,
    /// Maximum series (default 20, clamped to 1..=1000)
    #[serde(default)]
    pub limit: Option<u64>,
    /// Result offset for pagination
    #[serde(default)]
    pub offset: Option<u64>,
    /// Sort field for the returned series
    #[serde(default)]
    pub order_by: Option<String>,
    /// `asc` or `desc`
    #[serde(default)]
    pub sort_order: Option<String>,
}

/// Series owned by a category.
pub async fn get_fred_category_series(ctx: &AppContext, args: CategorySeriesArgs) -> ToolResponse {
    const TOOL: &str = "get_fred_category_series";
    let limit = clamp_limit(args.limit);
    let offset = args.offset.unwrap_or(0);
    let mut metadata = echo_metadata(&[
        ("category_id", json!(args.category_id)),
        ("limit", json!(limit)),
        ("offset", json!(offset)),
        ("order_by", json!(args.order_by)),
        ("sort_order", json!(args.sort_order)),
    ]);

    let validated = validate_category_id(args.category_id)
        .and_then(|_| match args.order_by.as_deref() {
            Some(order_by) => validate_enum(
                "order_by",
                order_by,
                &[
                    "series_id",
                    "title",
                    "units",
                    "frequency",
                    "seasonal_adjustment",
                    "last_updated",
                    "observation_start",
                    "observation_end",
                    "popularity",
                ],
            ),
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
        ("category_id", Some(args.category_id.to_string())),
        ("limit", Some(limit.to_string())),
        ("offset", Some(offset.to_string())),
        ("order_by", args.order_by.clone()),
        ("sort_order", args.sort_order.clone()),
    ];

    match ctx
        .client
        .get_json(TOOL, "fred/category/series", &params, ns::CATEGORIES, None)
        .await
    {
        Ok((raw, meta)) => {
            metadata.insert("cache_hit".to_string(), json!(meta.cache_hit));
            let series = compact_series_list(&raw);
            let data = json!({
                "category_id": args.category_id,
                "count": raw.get("count").cloned().unwrap_or(json!(series.len())),
                "series": series,
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
    fn test_negative_category_rejected() {
        let err = validate_category_id(-1).unwrap_err();
        assert!(err.to_string().contains("category_id"));
        assert!(validate_category_id(0).is_ok());
        assert!(validate_category_id(32991).is_ok());
    }
}
