use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum FredQueryError {
    /// Missing or invalid configuration at bootstrap. Fatal.
    #[error("Configuration error: {context}")]
    Config {
        /// Error context
        context: String,
    },

    /// Invalid tool argument. Never reaches FRED.
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Rate limit exceeded past the retry budget
    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited {
        /// Milliseconds until retry is advisable
        retry_after_ms: Option<u64>,
    },

    /// FRED rejected the request with a non-429 4xx. Not retriable.
    #[error("FRED rejected request with HTTP {status}: {context}")]
    UpstreamRejected {
        /// HTTP status code
        status: u16,
        /// Error context
        context: String,
    },

    /// FRED server error (5xx) after retry exhaustion
    #[error("FRED server error {status} after {retry_count} attempts")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Attempts made before giving up
        retry_count: u32,
    },

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    /// Response structure error - missing or malformed fields
    #[error("Response structure error in '{field}': {context}")]
    ResponseStructureError {
        /// Field name that caused the error
        field: String,
        /// Error context
        context: String,
    },

    /// Network timeout
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Workflow failure: every upstream call failed or returned nothing
    #[error("No data fetched: {}", diagnostics.join("; "))]
    NoDataFetched {
        /// Per-series failure diagnostics
        diagnostics: Vec<String>,
    },

    /// Workflow failure: date alignment left fewer than 2 series
    #[error("No common observation dates: {context}")]
    NoCommonDates {
        /// Error context
        context: String,
    },

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Tokio runtime / filesystem error
    #[error("Runtime error: {0}")]
    RuntimeError(#[from] std::io::Error),
}

/// Error kind for the response envelope, logging, and metrics.
///
/// These are the wire-visible `metadata.error_kind` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bootstrap configuration errors (fatal)
    Config,
    /// Tool argument validation errors
    Validation,
    /// Rate limiting errors
    RateLimited,
    /// FRED 4xx rejections other than 429
    Upstream4xx,
    /// FRED 5xx after retry exhaustion
    Upstream5xx,
    /// Network or decode failures after retry exhaustion
    Transport,
    /// Workflow: all upstream calls failed or empty
    NoDataFetched,
    /// Workflow: alignment left fewer than 2 series
    NoCommonDates,
    /// Caller cancellation
    Cancelled,
}

impl ErrorKind {
    /// Wire representation used in `metadata.error_kind` and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "CONFIG",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Upstream4xx => "UPSTREAM_4XX",
            ErrorKind::Upstream5xx => "UPSTREAM_5XX",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::NoDataFetched => "NO_DATA_FETCHED",
            ErrorKind::NoCommonDates => "NO_COMMON_DATES",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, FredQueryError>;

impl FredQueryError {
    /// Check if this error is retriable within the client's attempt loop
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FredQueryError::RateLimited { .. }
                | FredQueryError::ServerError { .. }
                | FredQueryError::HttpError(_)
                | FredQueryError::Timeout { .. }
        )
    }

    /// Suggested retry delay in milliseconds, if any
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => *retry_after_ms,
            Self::Timeout { .. } => Some(2_000),
            Self::ServerError { .. } => Some(5_000),
            _ => None,
        }
    }

    /// Map the error to its wire-visible kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::InvalidParameter { .. } => ErrorKind::Validation,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::UpstreamRejected { .. } => ErrorKind::Upstream4xx,
            Self::ServerError { .. } => ErrorKind::Upstream5xx,
            Self::HttpError(_)
            | Self::JsonParseError(_)
            | Self::ResponseStructureError { .. }
            | Self::Timeout { .. }
            | Self::RuntimeError(_) => ErrorKind::Transport,
            Self::NoDataFetched { .. } => ErrorKind::NoDataFetched,
            Self::NoCommonDates { .. } => ErrorKind::NoCommonDates,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Shorthand for a validation error naming the offending field
    pub fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retriable() {
        assert!(
            FredQueryError::RateLimited {
                retry_after_ms: None
            }
            .is_retriable()
        );
        assert!(
            FredQueryError::ServerError {
                status: 500,
                retry_count: 3
            }
            .is_retriable()
        );
        assert!(FredQueryError::Timeout { timeout_ms: 5000 }.is_retriable());
        assert!(
            !FredQueryError::InvalidParameter {
                param: "limit".to_string(),
                reason: "out of range".to_string()
            }
            .is_retriable()
        );
        assert!(
            !FredQueryError::UpstreamRejected {
                status: 400,
                context: "bad series".to_string()
            }
            .is_retriable()
        );
    }

    #[test]
    fn test_retry_after_ms() {
        assert_eq!(
            FredQueryError::RateLimited {
                retry_after_ms: Some(1500)
            }
            .retry_after_ms(),
            Some(1500)
        );
        assert_eq!(
            FredQueryError::Timeout { timeout_ms: 5000 }.retry_after_ms(),
            Some(2_000)
        );
        assert_eq!(
            FredQueryError::ServerError {
                status: 503,
                retry_count: 3
            }
            .retry_after_ms(),
            Some(5_000)
        );
        assert_eq!(FredQueryError::Cancelled.retry_after_ms(), None);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            FredQueryError::Config {
                context: "missing FRED_API_KEY".to_string()
            }
            .kind(),
            ErrorKind::Config
        );
        assert_eq!(
            FredQueryError::invalid("observation_start", "not a date").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FredQueryError::UpstreamRejected {
                status: 404,
                context: "unknown endpoint".to_string()
            }
            .kind(),
            ErrorKind::Upstream4xx
        );
        assert_eq!(FredQueryError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_error_kind_wire_strings() {
        assert_eq!(ErrorKind::Validation.as_str(), "VALIDATION");
        assert_eq!(ErrorKind::RateLimited.as_str(), "RATE_LIMITED");
        assert_eq!(ErrorKind::Upstream4xx.as_str(), "UPSTREAM_4XX");
        assert_eq!(ErrorKind::NoCommonDates.as_str(), "NO_COMMON_DATES");
        assert_eq!(ErrorKind::NoCommonDates.to_string(), "NO_COMMON_DATES");
    }

    #[test]
    fn test_no_data_fetched_joins_diagnostics() {
        let err = FredQueryError::NoDataFetched {
            diagnostics: vec!["USA: HTTP 500".to_string(), "DEU: empty".to_string()],
        };
        assert!(err.to_string().contains("USA: HTTP 500"));
        assert!(err.to_string().contains("DEU: empty"));
    }
}
