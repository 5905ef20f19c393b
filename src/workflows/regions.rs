//! Static lookup table mapping regions to their inflation index series.
//!
//! European regions resolve to HICP where Eurostat publishes one; everything
//! else uses the national CPI. The table records the methodology differences
//! (owner-occupied housing, mortgage interest) that drive the comparability
//! warnings, plus each central bank's target where one exists.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

/// Inflation index methodology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexType {
    /// Harmonized index of consumer prices (EU methodology, excludes
    /// owner-occupied housing)
    Hicp,
    /// National consumer price index
    Cpi,
    /// Personal consumption expenditures price index
    Pce,
}

impl IndexType {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Hicp => "HICP",
            IndexType::Cpi => "CPI",
            IndexType::Pce => "PCE",
        }
    }
}

/// One region's inflation series and its comparability traits.
#[derive(Debug, Clone)]
pub struct RegionInflation {
    /// Region code (ISO 3166-1 alpha-3, or an aggregate like `EUZ`)
    pub region_code: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// FRED series id for the price index
    pub series_id: &'static str,
    /// Index methodology
    pub index_type: IndexType,
    /// Publishing source
    pub source: &'static str,
    /// Whether owner-occupied housing costs are included
    pub includes_owner_housing: bool,
    /// Native publication frequency
    pub frequency: &'static str,
    /// Methodology notes surfaced in warnings
    pub notes: &'static str,
    /// Central bank inflation target in percent, if one is published
    pub central_bank_target: Option<f64>,
}

/// The region table. Curated against FRED series metadata; entries must point
/// at INDEX series, never at pre-computed growth-rate series.
pub const REGION_TABLE: &[RegionInflation] = &[
    RegionInflation {
        region_code: "USA",
        name: "United States",
        series_id: "CPIAUCSL",
        index_type: IndexType::Cpi,
        source: "U.S. Bureau of Labor Statistics",
        includes_owner_housing: true,
        frequency: "m",
        notes: "Fed targets 2% PCE (not CPI); CPI includes owners' equivalent rent",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "EUZ",
        name: "Euro Area",
        series_id: "CP0000EZ19M086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "ECB targets 2% HICP over the medium term",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "DEU",
        name: "Germany",
        series_id: "CP0000DEM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "FRA",
        name: "France",
        series_id: "CP0000FRM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "ITA",
        name: "Italy",
        series_id: "CP0000ITM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "ESP",
        name: "Spain",
        series_id: "CP0000ESM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "NLD",
        name: "Netherlands",
        series_id: "CP0000NLM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "AUT",
        name: "Austria",
        series_id: "CP0000ATM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "BEL",
        name: "Belgium",
        series_id: "CP0000BEM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "PRT",
        name: "Portugal",
        series_id: "CP0000PTM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "GRC",
        name: "Greece",
        series_id: "CP0000GRM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "IRL",
        name: "Ireland",
        series_id: "CP0000IEM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "FIN",
        name: "Finland",
        series_id: "CP0000FIM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "GBR",
        name: "United Kingdom",
        series_id: "GBRCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: false,
        frequency: "m",
        notes: "UK CPI follows HICP methodology; CPIH (with housing) is the ONS lead measure",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "JPN",
        name: "Japan",
        series_id: "JPNCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "CAN",
        name: "Canada",
        series_id: "CANCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "Canadian CPI includes mortgage interest cost, amplifying rate-hike pass-through",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "AUS",
        name: "Australia",
        series_id: "AUSCPIALLQINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "q",
        notes: "Quarterly publication; RBA targets the 2-3% band midpoint",
        central_bank_target: Some(2.5),
    },
    RegionInflation {
        region_code: "KOR",
        name: "South Korea",
        series_id: "KORCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "CHE",
        name: "Switzerland",
        series_id: "CHECPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "SNB defines price stability as below 2%",
        central_bank_target: Some(1.0),
    },
    RegionInflation {
        region_code: "SWE",
        name: "Sweden",
        series_id: "CP0000SEM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "Riksbank targets CPIF; HICP shown for cross-country comparability",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "NOR",
        name: "Norway",
        series_id: "NORCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "DNK",
        name: "Denmark",
        series_id: "CP0000DKM086NEST",
        index_type: IndexType::Hicp,
        source: "Eurostat",
        includes_owner_housing: false,
        frequency: "m",
        notes: "Krone pegged to the euro; no independent inflation target",
        central_bank_target: None,
    },
    RegionInflation {
        region_code: "NZL",
        name: "New Zealand",
        series_id: "NZLCPIALLQINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "q",
        notes: "Quarterly publication",
        central_bank_target: Some(2.0),
    },
    RegionInflation {
        region_code: "MEX",
        name: "Mexico",
        series_id: "MEXCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "",
        central_bank_target: Some(3.0),
    },
    RegionInflation {
        region_code: "BRA",
        name: "Brazil",
        series_id: "BRACPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(3.0),
    },
    RegionInflation {
        region_code: "RUS",
        name: "Russia",
        series_id: "RUSCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: false,
        frequency: "m",
        notes: "",
        central_bank_target: Some(4.0),
    },
    RegionInflation {
        region_code: "IND",
        name: "India",
        series_id: "INDCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "RBI targets 4% ±2pp",
        central_bank_target: Some(4.0),
    },
    RegionInflation {
        region_code: "CHN",
        name: "China",
        series_id: "CHNCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "Government target is an annual ceiling, not a symmetric objective",
        central_bank_target: Some(3.0),
    },
    RegionInflation {
        region_code: "ZAF",
        name: "South Africa",
        series_id: "ZAFCPIALLMINMEI",
        index_type: IndexType::Cpi,
        source: "OECD Main Economic Indicators",
        includes_owner_housing: true,
        frequency: "m",
        notes: "SARB targets the 3-6% band midpoint",
        central_bank_target: Some(4.5),
    },
];

/// Named region presets that expand to fixed code lists.
pub const REGION_PRESETS: &[(&str, &[&str])] = &[
    ("g7", &["USA", "CAN", "GBR", "DEU", "FRA", "ITA", "JPN"]),
    ("brics", &["BRA", "RUS", "IND", "CHN", "ZAF"]),
    ("eurozone_core", &["DEU", "FRA", "NLD", "AUT", "BEL"]),
    ("eurozone_periphery", &["ITA", "ESP", "PRT", "GRC", "IRL"]),
    ("nordic", &["SWE", "NOR", "DNK", "FIN"]),
    ("north_america", &["USA", "CAN", "MEX"]),
    ("asia_pacific", &["JPN", "KOR", "CHN", "IND", "AUS", "NZL"]),
    ("europe_major", &["DEU", "FRA", "GBR", "ITA", "ESP"]),
];

static REGION_INDEX: Lazy<HashMap<&'static str, &'static RegionInflation>> =
    Lazy::new(|| REGION_TABLE.iter().map(|r| (r.region_code, r)).collect());

/// Look up a region by its code (case-insensitive).
pub fn lookup(region_code: &str) -> Option<&'static RegionInflation> {
    REGION_INDEX
        .get(region_code.to_ascii_uppercase().as_str())
        .copied()
}

/// Expand a mixed list of codes and preset names into deduplicated region
/// codes, preserving first-seen order. Unknown entries land in `warnings`.
pub fn expand_regions(inputs: &[String]) -> (Vec<&'static str>, Vec<String>) {
    let mut codes: Vec<&'static str> = Vec::new();
    let mut warnings = Vec::new();

    let mut push = |code: &str, warnings: &mut Vec<String>| match lookup(code) {
        Some(region) => {
            if !codes.contains(&region.region_code) {
                codes.push(region.region_code);
            }
        }
        None => warnings.push(format!("unknown region '{code}' dropped")),
    };

    for input in inputs {
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if let Some((_, members)) = REGION_PRESETS
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
