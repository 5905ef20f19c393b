//! The response envelope shared by every tool.
//!
//! Shape is invariant: `{tool, data, metadata}` on success,
//! `{tool, error, metadata}` on failure, never both `data` and `error`.
//! `metadata` always carries `fetch_date` (RFC 3339 UTC) plus the echoed
//! effective parameters. Serialization is compact; pretty-printing wastes
//! tokens on the LLM side.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::FredQueryError;

/// JSON envelope returned by every tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    /// Tool name, echoed verbatim
    pub tool: String,
    /// Payload. Present exactly when `error` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Request metadata: `fetch_date`, `cache_hit`, echoed parameters
    pub metadata: Map<String, Value>,
    /// Human-readable error message. Present exactly when `data` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    /// Build a success envelope. `fetch_date` is stamped here.
    pub fn success(tool: &str, data: Value, mut metadata: Map<String, Value>) -> Self {
        metadata.insert("fetch_date".to_string(), json!(Utc::now().to_rfc3339()));
        Self {
            tool: tool.to_string(),
            data: Some(data),
            metadata,
            error: None,
        }
    }

    /// Build an error envelope carrying the error kind in metadata.
    pub fn failure(tool: &str, err: &FredQueryError, mut metadata: Map<String, Value>) -> Self {
        metadata.insert("fetch_date".to_string(), json!(Utc::now().to_rfc3339()));
        metadata.insert("error_kind".to_string(), json!(err.kind().as_str()));
        if let Some(retry_after_ms) = err.retry_after_ms() {
            metadata.insert("retry_after_ms".to_string(), json!(retry_after_ms));
        }
        Self {
            tool: tool.to_string(),
            data: None,
            metadata,
            error: Some(err.to_string()),
        }
    }

    /// Collapse a `Result` into the envelope.
    pub fn from_result(
        tool: &str,
        result: crate::error::Result<Value>,
        metadata: Map<String, Value>,
    ) -> Self {
        match result {
            Ok(data) => Self::success(tool, data, metadata),
            Err(err) => Self::failure(tool, &err, metadata),
        }
    }

    /// Compact JSON with minimal separators.
    pub fn to_compact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // Envelope fields are all serializable; this is unreachable in
            // practice but the tool contract forbids panicking.
            format!(
                "{{\"tool\":{:?},\"error\":\"serialization failed: {}\",\"metadata\":{{}}}}",
                self.tool, e
            )
        })
    }
}

/// Start a metadata map from `(key, value)` echo pairs.
pub fn echo_metadata(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        if !value.is_null() {
            map.insert(key.to_string(), value.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_data_and_no_error() {
        let resp = ToolResponse::success("search_fred_series", json!({"hits": 3}), Map::new());
        assert_eq!(resp.tool, "search_fred_series");
        assert!(resp.data.is_some());
        assert!(resp.error.is_none());
        assert!(resp.metadata.contains_key("fetch_date"));

        let wire: Value = serde_json::from_str(&resp.to_compact_json()).unwrap();
        assert!(wire.get("data").is_some());
        assert!(wire.get("error").is_none());
    }

    #[test]
    fn test_failure_has_error_kind_and_no_data() {
        let err = FredQueryError::invalid("observation_start", "expected YYYY-MM-DD");
        let resp = ToolResponse::failure("get_fred_series_observations", &err, Map::new());
        assert!(resp.data.is_none());
        assert!(resp.error.as_deref().unwrap().contains("observation_start"));
        assert_eq!(resp.metadata["error_kind"], "VALIDATION");

        let wire: Value = serde_json::from_str(&resp.to_compact_json()).unwrap();
        assert!(wire.get("data").is_none());
        assert!(wire.get("error").is_some());
        assert!(wire["metadata"].get("fetch_date").is_some());
    }

    #[test]
    fn test_rate_limited_failure_carries_retry_hint() {
        let err = FredQueryError::RateLimited {
            retry_after_ms: Some(5_000),
        };
        let resp = ToolResponse::failure("search_fred_series", &err, Map::new());
        assert_eq!(resp.metadata["retry_after_ms"], 5_000);
        assert_eq!(resp.metadata["error_kind"], "RATE_LIMITED");
    }

    #[test]
    fn test_compact_json_has_no_pretty_whitespace() {
        let resp = ToolResponse::success("t", json!({"a": [1, 2, 3]}), Map::new());
        let wire = resp.to_compact_json();
        assert!(!wire.contains('\n'));
        assert!(!wire.contains(": "));
    }

    #[test]
    fn test_echo_metadata_skips_nulls() {
        let meta = echo_metadata(&[
            ("limit", json!(20)),
            ("search_text", json!("cpi")),
            ("tag_names", Value::Null),
        ]);
        assert_eq!(meta.len(), 2);
        assert!(!meta.contains_key("tag_names"));
    }
}
