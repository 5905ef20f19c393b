//! FRED (Federal Reserve Economic Data) API access.
//!
//! [`FredClient`] is the single chokepoint for outbound HTTP: it layers the
//! shared cache, the global rate limiter, and a bounded retry loop under one
//! `get_json` pipeline. Construct it once at bootstrap and share it through
//! the [`crate::AppContext`].
//!
//! Requires a free API key from
//! <https://fred.stlouisfed.org/docs/api/api_key.html>.

mod client;
pub mod models;

pub use client::{FetchMeta, FredClient};
pub use models::{Category, Observation, Series, SeriesInfo, Tag, TagGroup};
