//! Country table and GDP series-id mapping for the cross-country workflow.
//!
//! FRED mirrors the World Bank development indicators under predictable ids
//! keyed by ISO 3166-1 alpha-3 codes; derived variants (`growth_rate`, and
//! per-capita fallbacks) have no series id and are computed locally.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{FredQueryError, Result};

/// GDP measurement variants. `growth_rate` is always derived; the per-capita
/// variants are fetched directly and fall back to `total / population`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GdpVariant {
    /// GDP in current US dollars
    NominalUsd,
    /// GDP in constant 2010 US dollars
    Constant2010,
    /// GDP per capita, constant dollars
    PerCapitaConstant,
    /// GDP per capita, PPP-adjusted
    PerCapitaPpp,
    /// GDP, PPP-adjusted
    PppAdjusted,
    /// Total population
    Population,
    /// Year-over-year growth of constant-dollar GDP, percent
    GrowthRate,
}

impl GdpVariant {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            GdpVariant::NominalUsd => "nominal_usd",
            GdpVariant::Constant2010 => "constant_2010",
            GdpVariant::PerCapitaConstant => "per_capita_constant",
            GdpVariant::PerCapitaPpp => "per_capita_ppp",
            GdpVariant::PppAdjusted => "ppp_adjusted",
            GdpVariant::Population => "population",
            GdpVariant::GrowthRate => "growth_rate",
        }
    }

    /// Parse a wire value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "nominal_usd" => Ok(GdpVariant::NominalUsd),
            "constant_2010" => Ok(GdpVariant::Constant2010),
            "per_capita_constant" => Ok(GdpVariant::PerCapitaConstant),
            "per_capita_ppp" => Ok(GdpVariant::PerCapitaPpp),
            "ppp_adjusted" => Ok(GdpVariant::PppAdjusted),
            "population" => Ok(GdpVariant::Population),
            "growth_rate" => Ok(GdpVariant::GrowthRate),
            other => Err(FredQueryError::invalid(
                "gdp_variants",
                format!(
                    "'{other}' is not one of nominal_usd|constant_2010|per_capita_constant|\
                     per_capita_ppp|ppp_adjusted|population|growth_rate"
                ),
            )),
        }
    }

    /// FRED series id for a country, or `None` for derived variants.
    pub fn series_id(&self, iso3: &str) -> Option<String> {
        match self {
            GdpVariant::NominalUsd => Some(format!("MKTGDP{iso3}646NWDB")),
            GdpVariant::Constant2010 => Some(format!("NYGDPMKTPKD{iso3}")),
            GdpVariant::PerCapitaConstant => Some(format!("NYGDPPCAPKD{iso3}")),
            GdpVariant::PerCapitaPpp => Some(format!("NYGDPPCAPPPKD{iso3}")),
            GdpVariant::PppAdjusted => Some(format!("NYGDPMKTPPPKD{iso3}")),
            GdpVariant::Population => Some(format!("POPTOT{iso3}647NWDB")),
            GdpVariant::GrowthRate => None,
        }
    }

    /// The per-capita fallback divides this total by population.
    pub fn per_capita_source(&self) -> Option<GdpVariant> {
        match self {
            GdpVariant::PerCapitaConstant => Some(GdpVariant::Constant2010),
            GdpVariant::PerCapitaPpp => Some(GdpVariant::PppAdjusted),
            _ => None,
        }
    }

    /// Multiplier converting stored series units to whole dollars before a
    /// per-capita division. The World Bank mirrors are already in dollars.
    pub fn value_scale(&self) -> f64 {
        1.0
    }
}

/// A country known to the GDP workflow.
#[derive(Debug, Clone, Copy)]
pub struct Country {
    /// ISO 3166-1 alpha-3 code
    pub code: &'static str,
    /// Human-readable name
    pub name: &'static str,
}

/// The country table.
pub const COUNTRY_TABLE: &[Country] = &[
    Country { code: "USA", name: "United States" },
    Country { code: "CAN", name: "Canada" },
    Country { code: "MEX", name: "Mexico" },
    Country { code: "BRA", name: "Brazil" },
    Country { code: "ARG", name: "Argentina" },
    Country { code: "CHL", name: "Chile" },
    Country { code: "COL", name: "Colombia" },
    Country { code: "PER", name: "Peru" },
    Country { code: "GBR", name: "United Kingdom" },
    Country { code: "DEU", name: "Germany" },
    Country { code: "FRA", name: "France" },
    Country { code: "ITA", name: "Italy" },
    Country { code: "ESP", name: "Spain" },
    Country { code: "PRT", name: "Portugal" },
    Country { code: "GRC", name: "Greece" },
    Country { code: "IRL", name: "Ireland" },
    Country { code: "NLD", name: "Netherlands" },
    Country { code: "BEL", name: "Belgium" },
    Country { code: "AUT", name: "Austria" },
    Country { code: "CHE", name: "Switzerland" },
    Country { code: "SWE", name: "Sweden" },
    Country { code: "NOR", name: "Norway" },
    Country { code: "DNK", name: "Denmark" },
    Country { code: "FIN", name: "Finland" },
    Country { code: "POL", name: "Poland" },
    Country { code: "TUR", name: "Turkey" },
    Country { code: "RUS", name: "Russia" },
    Country { code: "SAU", name: "Saudi Arabia" },
    Country { code: "ARE", name: "United Arab Emirates" },
    Country { code: "ISR", name: "Israel" },
    Country { code: "EGY", name: "Egypt" },
    Country { code: "NGA", name: "Nigeria" },
    Country { code: "ZAF", name: "South Africa" },
    Country { code: "KEN", name: "Kenya" },
    Country { code: "ETH", name: "Ethiopia" },
    Country { code: "CHN", name: "China" },
    Country { code: "JPN", name: "Japan" },
    Country { code: "KOR", name: "South Korea" },
    Country { code: "TWN", name: "Taiwan" },
    Country { code: "IND", name: "India" },
    Country { code: "IDN", name: "Indonesia" },
    Country { code: "THA", name: "Thailand" },
    Country { code: "VNM", name: "Vietnam" },
    Country { code: "MYS", name: "Malaysia" },
    Country { code: "PHL", name: "Philippines" },
    Country { code: "SGP", name: "Singapore" },
    Country { code: "AUS", name: "Australia" },
    Country { code: "NZL", name: "New Zealand" },
];

/// Named country presets that expand to fixed code lists.
pub const COUNTRY_PRESETS: &[(&str, &[&str])] = &[
    ("g7", &["USA", "CAN", "GBR", "DEU", "FRA", "ITA", "JPN"]),
    (
        "g20",
        &[
            "USA", "CAN", "MEX", "BRA", "ARG", "GBR", "DEU", "FRA", "ITA", "RUS", "TUR", "SAU",
            "ZAF", "CHN", "JPN", "KOR", "IND", "IDN", "AUS",
        ],
    ),
    ("brics", &["BRA", "RUS", "IND", "CHN", "ZAF"]),
    (
        "oecd",
        &[
            "USA", "CAN", "MEX", "CHL", "COL", "GBR", "DEU", "FRA", "ITA", "ESP", "PRT", "GRC",
            "IRL", "NLD", "BEL", "AUT", "CHE", "SWE", "NOR", "DNK", "FIN", "POL", "TUR", "ISR",
            "JPN", "KOR", "AUS", "NZL",
        ],
    ),
    ("latam", &["MEX", "BRA", "ARG", "CHL", "COL", "PER"]),
    ("eurozone_core", &["DEU", "FRA", "NLD", "AUT", "BEL"]),
    ("eurozone_periphery", &["ITA", "ESP", "PRT", "GRC", "IRL"]),
    ("nordic", &["SWE", "NOR", "DNK", "FIN"]),
    ("north_america", &["USA", "CAN", "MEX"]),
    (
        "asia_pacific",
        &["CHN", "JPN", "KOR", "IND", "IDN", "AUS", "NZL"],
    ),
    ("east_asia", &["CHN", "JPN", "KOR", "TWN"]),
    (
        "southeast_asia",
        &["IDN", "THA", "VNM", "MYS", "PHL", "SGP"],
    ),
    ("middle_east", &["SAU", "ARE", "ISR", "TUR", "EGY"]),
    ("africa", &["NGA", "ZAF", "EGY", "KEN", "ETH"]),
    (
        "emerging",
        &["BRA", "RUS", "IND", "CHN", "ZAF", "MEX", "IDN", "TUR", "VNM", "PHL"],
    ),
    (
        "developed",
        &["USA", "CAN", "GBR", "DEU", "FRA", "ITA", "JPN", "AUS", "CHE", "SWE", "NLD", "SGP"],
    ),
];

static COUNTRY_INDEX: Lazy<HashMap<&'static str, &'static Country>> =
    Lazy::new(|| COUNTRY_TABLE.iter().map(|c| (c.code, c)).collect());

/// Look up a country by its ISO code (case-insensitive).
pub fn lookup(code: &str) -> Option<&'static Country> {
    COUNTRY_INDEX.get(code.to_ascii_uppercase().as_str()).copied()
}

/// Expand a mixed list of codes and preset names into deduplicated country
/// codes, preserving first-seen order. Unknown entries land in `warnings`.
pub fn expand_countries(inputs: &[String]) -> (Vec<&'static str>, Vec<String>) {
    let mut codes: Vec<&'static str> = Vec::new();
    let mut warnings = Vec::new();

    let mut push = |code: &str, warnings: &mut Vec<String>| match lookup(code) {
        Some(country) => {
            if !codes.contains(&country.code) {
                codes.push(country.code);
            }
        }
        None => warnings.push(format!("unknown country '{code}' dropped")),
    };

    for input in inputs {
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if let Some((_, members)) = COUNTRY_PRESETS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(input))
        {
            for member in *members {
                push(member, &mut warnings);
            }
        } else {
            push(input, &mut warnings);
        }
    }

    (codes, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_wire_round_trip() {
        for variant in [
            GdpVariant::NominalUsd,
            GdpVariant::Constant2010,
            GdpVariant::PerCapitaConstant,
            GdpVariant::PerCapitaPpp,
            GdpVariant::PppAdjusted,
            GdpVariant::Population,
            GdpVariant::GrowthRate,
        ] {
            assert_eq!(GdpVariant::parse(variant.as_str()).unwrap(), variant);
        }
        assert!(GdpVariant::parse("real").is_err());
    }

    #[test]
    fn test_series_id_patterns() {
        assert_eq!(
            GdpVariant::PerCapitaConstant.series_id("USA").as_deref(),
            Some("NYGDPPCAPKDUSA")
        );
        assert_eq!(
            GdpVariant::NominalUsd.series_id("JPN").as_deref(),
            Some("MKTGDPJPN646NWDB")
        );
        assert_eq!(
            GdpVariant::Population.series_id("DEU").as_deref(),
            Some("POPTOTDEU647NWDB")
        );
        assert!(GdpVariant::GrowthRate.series_id("USA").is_none());
    }

    #[test]
    fn test_per_capita_sources() {
        assert_eq!(
            GdpVariant::PerCapitaConstant.per_capita_source(),
            Some(GdpVariant::Constant2010)
        );
        assert_eq!(
            GdpVariant::PerCapitaPpp.per_capita_source(),
            Some(GdpVariant::PppAdjusted)
        );
        assert_eq!(GdpVariant::Constant2010.per_capita_source(), None);
    }

    #[test]
    fn test_every_preset_member_resolves() {
        for (preset, members) in COUNTRY_PRESETS {
            for member in *members {
                assert!(
                    lookup(member).is_some(),
                    "preset '{preset}' references unknown country '{member}'"
                );
            }
        }
    }

    #[test]
    fn test_g7_and_dedup() {
        let (codes, warnings) = expand_countries(&["g7".to_string(), "USA".to_string()]);
        assert_eq!(codes.len(), 7);
        assert_eq!(codes[0], "USA");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unknown_country_warns() {
        let (codes, warnings) = expand_countries(&["USA".to_string(), "XYZ".to_string()]);
        assert_eq!(codes, vec!["USA"]);
        assert!(warnings[0].contains("XYZ"));
    }
}
