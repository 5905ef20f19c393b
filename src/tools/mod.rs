//! Tool orchestrators: one thin module per FRED endpoint family.
//!
//! Every tool validates its arguments, forwards to the [`FredClient`]
//! pipeline, and shapes a compact [`ToolResponse`]. Validation failures
//! return an error envelope without touching FRED.

pub mod categories;
pub mod health;
pub mod observations;
pub mod search;
pub mod tags;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{FredQueryError, Result};

/// Default result count for search-style tools
pub(crate) const DEFAULT_LIMIT: u64 = 20;

/// FRED's hard ceiling on result counts
pub(crate) const MAX_LIMIT: u64 = 1000;

/// Validate a `YYYY-MM-DD` date argument.
pub(crate) fn validate_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        FredQueryError::invalid(field, format!("expected YYYY-MM-DD, got '{value}'"))
    })
}

/// Validate an optional date pair, enforcing `start <= end`.
pub(crate) fn validate_date_range(
    start_field: &str,
    start: Option<&str>,
    end_field: &str,
    end: Option<&str>,
) -> Result<()> {
    let start = start.map(|s| validate_date(start_field, s)).transpose()?;
    let end = end.map(|e| validate_date(end_field, e)).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(FredQueryError::invalid(
                start_field,
                format!("{start_field} ({start}) is after {end_field} ({end})"),
            ));
        }
    }
    Ok(())
}

/// Clamp a limit into `[1, 1000]`, defaulting to 20.
pub(crate) fn clamp_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Reject values outside a closed set, naming the field and the options.
pub(crate) fn validate_enum(field: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(FredQueryError::invalid(
            field,
            format!("'{value}' is not one of {}", allowed.join("|")),
        ))
    }
}

/// Require a non-blank string argument.
pub(crate) fn require_nonempty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(FredQueryError::invalid(field, "must not be empty"))
    } else {
        Ok(())
    }
}

/// Validate a semicolon-delimited tag list (`"usa;cpi"`): no blank segments.
pub(crate) fn validate_tag_list(field: &str, value: &str) -> Result<()> {
    require_nonempty(field, value)?;
    if value.split(';').any(|segment| segment.trim().is_empty()) {
        return Err(FredQueryError::invalid(
            field,
            "semicolon-delimited list contains an empty segment",
        ));
    }
    Ok(())
}

/// Project a FRED `seriess` array down to the compact fields tools return.
pub(crate) fn compact_series_list(json: &Value) -> Vec<Value> {
    json.get("seriess")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.get("id"),
                        "title": s.get("title"),
                        "frequency": s.get("frequency_short").or_else(|| s.get("frequency")),
                        "units": s.get("units_short").or_else(|| s.get("units")),
                        "seasonal_adjustment": s
                            .get("seasonal_adjustment_short")
                            .or_else(|| s.get("seasonal_adjustment")),
                        "observation_start": s.get("observation_start"),
                        "observation_end": s.get("observation_end"),
                        "last_updated": s.get("last_updated"),
                        "popularity": s.get("popularity"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Project a FRED `tags` array down to the compact fields tools return.
pub(crate) fn compact_tag_list(json: &Value) -> Vec<Value> {
    json.get("tags")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.get("name"),
                        "group_id": t.get("group_id"),
                        "popularity": t.get("popularity"),
                        "series_count": t.get("series_count"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
