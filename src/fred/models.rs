//! Data models for FRED responses.
//!
//! FRED returns observation values as strings with `"."` marking a missing
//! value; the deserializers here normalize that into `Option<f64>` so every
//! number surfaced to analysis is finite or explicitly absent.

use serde::{Deserialize, Serialize};

/// A single observation in a FRED data series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Date of the observation as `YYYY-MM-DD`
    pub date: String,
    /// Observation value. `None` when FRED reports a missing value (`"."`).
    pub value: Option<f64>,
}

/// A FRED time series with its observations in ascending date order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    /// FRED series ID (e.g., `"CPIAUCSL"`, `"NYGDPPCAPKDUSA"`)
    pub id: String,
    /// Chronologically ordered observations
    pub observations: Vec<Observation>,
}

impl Series {
    /// Observations with a present value, still in date order.
    pub fn present(&self) -> impl Iterator<Item = (&str, f64)> {
        self.observations
            .iter()
            .filter_map(|o| o.value.map(|v| (o.date.as_str(), v)))
    }
}

/// Series metadata as returned by `fred/series`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesInfo {
    /// FRED series ID
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Observation frequency (e.g., `"Monthly"`)
    #[serde(default)]
    pub frequency: Option<String>,
    /// Units description (e.g., `"Index 1982-1984=100"`)
    #[serde(default)]
    pub units: Option<String>,
    /// Seasonal adjustment tag
    #[serde(default)]
    pub seasonal_adjustment: Option<String>,
    /// First available observation date
    #[serde(default)]
    pub observation_start: Option<String>,
    /// Last available observation date
    #[serde(default)]
    pub observation_end: Option<String>,
    /// Last update timestamp, FRED's format
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Relative popularity score
    #[serde(default)]
    pub popularity: Option<i64>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl SeriesInfo {
    /// Whether the units describe a price index rather than a rate of change.
    pub fn is_index_series(&self) -> bool {
        self.units
            .as_deref()
            .map(|u| u.to_ascii_lowercase().contains("index"))
            .unwrap_or(false)
    }
}

/// FRED tag group ids form a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagGroup {
    /// Frequency
    Freq,
    /// General / concept
    Gen,
    /// Geography
    Geo,
    /// Geography type
    Geot,
    /// Release
    Rls,
    /// Seasonal adjustment
    Seas,
    /// Source
    Src,
    /// Citation / copyright
    Cc,
}

impl TagGroup {
    /// Wire representation used by FRED's `tag_group_id` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagGroup::Freq => "freq",
            TagGroup::Gen => "gen",
            TagGroup::Geo => "geo",
            TagGroup::Geot => "geot",
            TagGroup::Rls => "rls",
            TagGroup::Seas => "seas",
            TagGroup::Src => "src",
            TagGroup::Cc => "cc",
        }
    }

    /// Parse FRED's `group_id` string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "freq" => Some(TagGroup::Freq),
            "gen" => Some(TagGroup::Gen),
            "geo" => Some(TagGroup::Geo),
            "geot" => Some(TagGroup::Geot),
            "rls" => Some(TagGroup::Rls),
            "seas" => Some(TagGroup::Seas),
            "src" => Some(TagGroup::Src),
            "cc" => Some(TagGroup::Cc),
            _ => None,
        }
    }
}

/// A FRED tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name (e.g., `"inflation"`)
    pub name: String,
    /// Group this tag belongs to
    #[serde(default)]
    pub group_id: Option<String>,
    /// Relative popularity score
    #[serde(default)]
    pub popularity: Option<i64>,
    /// Number of series carrying this tag
    #[serde(default)]
    pub series_count: Option<i64>,
    /// Creation timestamp, FRED's format
    #[serde(default)]
    pub created: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// A node in the FRED category tree, rooted at id 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category id
    pub id: i64,
    /// Category name
    pub name: String,
    /// Parent category id; 0's parent is itself
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_present_filters_missing() {
        let series = Series {
            id: "X".to_string(),
            observations: vec![
                Observation {
                    date: "2020-01-01".to_string(),
                    value: Some(1.0),
                },
                Observation {
                    date: "2020-02-01".to_string(),
                    value: None,
                },
                Observation {
                    date: "2020-03-01".to_string(),
                    value: Some(3.0),
                },
            ],
        };
        let present: Vec<(&str, f64)> = series.present().collect();
        assert_eq!(present, vec![("2020-01-01", 1.0), ("2020-03-01", 3.0)]);
    }

    #[test]
    fn test_is_index_series() {
        let mut info = SeriesInfo {
            id: "CPIAUCSL".to_string(),
            title: "CPI".to_string(),
            frequency: None,
            units: Some("Index 1982-1984=100".to_string()),
            seasonal_adjustment: None,
            observation_start: None,
            observation_end: None,
            last_updated: None,
            popularity: None,
            notes: None,
        };
        assert!(info.is_index_series());
        info.units = Some("Percent Change from Year Ago".to_string());
        assert!(!info.is_index_series());
        info.units = None;
        assert!(!info.is_index_series());
    }

    #[test]
    fn test_tag_group_round_trip() {
        for group in [
            TagGroup::Freq,
            TagGroup::Gen,
            TagGroup::Geo,
            TagGroup::Geot,
            TagGroup::Rls,
            TagGroup::Seas,
            TagGroup::Src,
            TagGroup::Cc,
        ] {
            assert_eq!(TagGroup::parse(group.as_str()), Some(group));
        }
        assert_eq!(TagGroup::parse("bogus"), None);
    }

    #[test]
    fn test_series_info_tolerates_sparse_json() {
        let info: SeriesInfo =
            serde_json::from_str(r#"{"id":"GDP","title":"Gross Domestic Product"}"#).unwrap();
        assert_eq!(info.id, "GDP");
        assert!(info.units.is_none());
    }
}
