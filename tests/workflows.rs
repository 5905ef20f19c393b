//! Workflow tests against a mock FRED: fanout, alignment, analysis, and the
//! structured failure modes.

use std::time::Duration;

use fred_query::workflows::gdp::{self, GdpArgs};
use fred_query::workflows::inflation::{self, InflationArgs};
use fred_query::{AppContext, Config};
use mockito::{Matcher, ServerGuard};
use serde_json::Value;

async fn test_ctx(server: &ServerGuard) -> AppContext {
    let config = Config::builder("test-key")
        .base_url(server.url())
        .timeout(Duration::from_secs(5))
        .fanout(4, 4)
        .build();
    AppContext::new(config).await.unwrap()
}

fn observations_body(points: &[(&str, f64)]) -> String {
    let observations: Vec<Value> = points
        .iter()
        .map(|(date, value)| {
            serde_json::json!({"date": date, "value": format!("{value}")})
        })
        .collect();
    serde_json::json!({ "observations": observations }).to_string()
}

async fn mock_series(server: &mut ServerGuard, series_id: &str, points: &[(&str, f64)]) {
    server
        .mock("GET", "/fred/series/observations")
        .match_query(Matcher::UrlEncoded("series_id".into(), series_id.into()))
        .with_status(200)
        .with_body(observations_body(points))
        .create_async()
        .await;
}

fn wire(response: &fred_query::ToolResponse) -> Value {
    serde_json::from_str(&response.to_compact_json()).unwrap()
}

// ---------------------------------------------------------------------------
// Inflation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_inflation_two_regions_latest_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let usa: Vec<(&str, f64)> = vec![
        ("2023-01-01", 6.4),
        ("2023-02-01", 6.0),
        ("2023-03-01", 5.0),
        ("2023-04-01", 4.9),
        ("2023-05-01", 4.0),
        ("2023-06-01", 3.0),
    ];
    let deu: Vec<(&str, f64)> = vec![
        ("2023-01-01", 8.7),
        ("2023-02-01", 8.7),
        ("2023-03-01", 7.4),
        ("2023-04-01", 7.2),
        ("2023-05-01", 6.1),
        ("2023-06-01", 6.4),
    ];
    mock_series(&mut server, "CPIAUCSL", &usa).await;
    mock_series(&mut server, "CP0000DEM086NEST", &deu).await;

    let ctx = test_ctx(&server).await;
    let response = inflation::compare_inflation_across_regions(
        &ctx,
        InflationArgs {
            regions: "USA,DEU".to_string(),
            metric: Some("all".to_string()),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);

    assert!(json.get("error").is_none(), "unexpected error: {json}");
    let latest = &json["data"]["comparison"]["latest"];
    assert_eq!(latest["date"], "2023-06-01");
    let ranking = latest["ranking"].as_array().unwrap();
    assert_eq!(ranking[0]["region"], "USA");
    assert_eq!(ranking[1]["region"], "DEU");

    // Every ranked region appears in series_used with matching identity
    let series_used = json["metadata"]["series_used"].as_array().unwrap();
    for entry in ranking {
        let region = entry["region"].as_str().unwrap();
        let used = series_used
            .iter()
            .find(|s| s["region"] == region)
            .expect("ranked region missing from series_used");
        assert!(used["series_id"].is_string());
        assert!(used["index_type"].is_string());
    }

    // USA CPI vs DEU HICP: mixed index types and housing treatment
    let warnings = json["data"]["comparability_warnings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w.as_str().unwrap().to_string())
        .collect::<Vec<_>>()
        .join(" | ");
    assert!(warnings.contains("Mixed index types"));
    assert!(warnings.contains("Owner-occupied housing"));
    assert!(warnings.contains("PCE"));

    // USA target analysis carries the PCE caveat
    let usa_notes = json["data"]["comparison"]["latest"]["target_analysis"]["USA"]["notes"]
        .as_str()
        .unwrap();
    assert!(usa_notes.contains("Fed targets 2% PCE (not CPI)"));

    // metric=all adds trends and convergence
    assert!(json["data"]["comparison"]["trends"].is_object());
    assert!(json["data"]["comparison"]["convergence"].is_object());
}

#[tokio::test]
async fn test_inflation_no_common_dates() {
    let mut server = mockito::Server::new_async().await;
    mock_series(&mut server, "CPIAUCSL", &[("2020-01-01", 2.0)]).await;
    mock_series(&mut server, "CP0000DEM086NEST", &[("2021-01-01", 3.0)]).await;

    let ctx = test_ctx(&server).await;
    let response = inflation::compare_inflation_across_regions(
        &ctx,
        InflationArgs {
            regions: "USA,DEU".to_string(),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert_eq!(json["metadata"]["error_kind"], "NO_COMMON_DATES");
    assert!(json.get("data").is_none());
}

#[tokio::test]
async fn test_inflation_all_fetches_failing_is_no_data() {
    let mut server = mockito::Server::new_async().await;
    let _catch_all = server
        .mock("GET", "/fred/series/observations")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error_code":400,"error_message":"series does not exist"}"#)
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let response = inflation::compare_inflation_across_regions(
        &ctx,
        InflationArgs {
            regions: "USA,DEU".to_string(),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert_eq!(json["metadata"]["error_kind"], "NO_DATA_FETCHED");
    assert!(json["error"].as_str().unwrap().contains("USA"));
}

#[tokio::test]
async fn test_inflation_region_cap_clamps_with_warning() {
    let mut server = mockito::Server::new_async().await;
    // Serve every series so only the clamp limits the region count
    for series_id in [
        "CPIAUCSL",
        "CANCPIALLMINMEI",
        "GBRCPIALLMINMEI",
        "CP0000DEM086NEST",
        "CP0000FRM086NEST",
    ] {
        mock_series(
            &mut server,
            series_id,
            &[("2023-01-01", 3.0), ("2023-02-01", 3.1), ("2023-03-01", 3.2)],
        )
        .await;
    }

    let ctx = test_ctx(&server).await;
    let response = inflation::compare_inflation_across_regions(
        &ctx,
        InflationArgs {
            regions: "g7".to_string(),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert!(json.get("error").is_none(), "unexpected error: {json}");
    // Default cap is 5: ITA and JPN drop off the g7 expansion
    let ranked = json["data"]["comparison"]["latest"]["ranking"]
        .as_array()
        .unwrap();
    assert_eq!(ranked.len(), 5);
    let warnings = json["data"]["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w.as_str().unwrap().to_string())
        .collect::<Vec<_>>()
        .join(" | ");
    assert!(warnings.contains("clamped"));
}

// ---------------------------------------------------------------------------
// GDP
// ---------------------------------------------------------------------------

fn annual(start_year: i32, count: usize, base: f64, rate: f64) -> Vec<(String, f64)> {
    (0..count)
        .map(|i| {
            (
                format!("{}-01-01", start_year + i as i32),
                base * (1.0 + rate).powi(i as i32),
            )
        })
        .collect()
}

async fn mock_annual(server: &mut ServerGuard, series_id: &str, points: &[(String, f64)]) {
    let borrowed: Vec<(&str, f64)> = points.iter().map(|(d, v)| (d.as_str(), *v)).collect();
    mock_series(server, series_id, &borrowed).await;
}

#[tokio::test]
async fn test_gdp_three_countries_analysis() {
    let mut server = mockito::Server::new_async().await;
    // Unmocked series (population, constant totals) fail fast with 404
    let _catch_all = server
        .mock("GET", "/fred/series/observations")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error_code":400,"error_message":"series does not exist"}"#)
        .create_async()
        .await;

    // Initial levels sit exactly on a line in log-space against the growth
    // rates, so the beta regression is unambiguous
    mock_annual(&mut server, "NYGDPPCAPKDUSA", &annual(1990, 30, 42_192.0, 0.01)).await;
    mock_annual(&mut server, "NYGDPPCAPKDDEU", &annual(1990, 30, 29_733.0, 0.02)).await;
    mock_annual(&mut server, "NYGDPPCAPKDJPN", &annual(1990, 30, 20_952.0, 0.03)).await;
    mock_annual(&mut server, "NYGDPPCAPKDKOR", &annual(1990, 30, 14_765.0, 0.04)).await;

    let ctx = test_ctx(&server).await;
    let response = gdp::analyze_gdp_cross_country(
        &ctx,
        GdpArgs {
            countries: "USA,DEU,JPN,KOR".to_string(),
            start_date: Some("1990-01-01".to_string()),
            end_date: Some("2019-12-31".to_string()),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert!(json.get("error").is_none(), "unexpected error: {json}");

    let analysis = &json["data"]["analysis"];
    // Per-country metrics with CAGR close to the construction rates
    let usa_cagr = analysis["per_country"]["USA"]["cagr"].as_f64().unwrap();
    let jpn_cagr = analysis["per_country"]["JPN"]["cagr"].as_f64().unwrap();
    assert!((usa_cagr - 1.0).abs() < 0.05, "usa cagr {usa_cagr}");
    assert!((jpn_cagr - 3.0).abs() < 0.05, "jpn cagr {jpn_cagr}");

    // Beta convergence: poorer countries grow faster by construction
    let beta = &analysis["convergence"]["beta"];
    assert!(beta["coefficient"].as_f64().unwrap() < 0.0);
    assert_eq!(beta["interpretation"], "catch-up growth");

    // Rankings
    let by_level = analysis["rankings"]["by_latest_level"].as_array().unwrap();
    assert_eq!(by_level[0]["country"], "USA");
    let by_cagr = analysis["rankings"]["by_cagr"].as_array().unwrap();
    assert_eq!(by_cagr[0]["country"], "KOR");

    // Fetch failures for unmocked series surface as warnings, not errors
    let warnings = json["data"]["warnings"].as_array().unwrap();
    assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("fetch failed")));
}

#[tokio::test]
async fn test_gdp_growth_rate_derivation_dates() {
    let mut server = mockito::Server::new_async().await;
    mock_annual(&mut server, "NYGDPMKTPKDUSA", &annual(2000, 5, 1.0e13, 0.02)).await;

    let ctx = test_ctx(&server).await;
    let response = gdp::analyze_gdp_cross_country(
        &ctx,
        GdpArgs {
            countries: "USA".to_string(),
            gdp_variants: Some(vec!["growth_rate".to_string()]),
            start_date: Some("2000-01-01".to_string()),
            include_population: Some(false),
            include_convergence: Some(false),
            include_rankings: Some(false),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert!(json.get("error").is_none(), "unexpected error: {json}");

    let usa = &json["data"]["analysis"]["per_country"]["USA"];
    // Growth series starts at the second level observation
    assert_eq!(usa["first_date"], "2001-01-01");
    assert_eq!(usa["observations"], 4);
    let latest = usa["latest"].as_f64().unwrap();
    assert!((latest - 2.0).abs() < 1e-6, "derived growth {latest}");
}

#[tokio::test]
async fn test_gdp_indexed_mode_base_year_100() {
    let mut server = mockito::Server::new_async().await;
    // Catch-all first: mockito gives the most recently created mock priority
    let _catch_all = server
        .mock("GET", "/fred/series/observations")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error_code":400,"error_message":"series does not exist"}"#)
        .create_async()
        .await;
    mock_annual(&mut server, "NYGDPPCAPKDUSA", &annual(1995, 10, 40_000.0, 0.01)).await;
    mock_annual(&mut server, "NYGDPPCAPKDDEU", &annual(1995, 10, 30_000.0, 0.02)).await;

    let ctx = test_ctx(&server).await;
    let response = gdp::analyze_gdp_cross_country(
        &ctx,
        GdpArgs {
            countries: "USA,DEU".to_string(),
            start_date: Some("1995-01-01".to_string()),
            comparison_mode: Some("indexed".to_string()),
            base_year: Some(2000),
            output_format: Some("dataset".to_string()),
            include_population: Some(false),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert!(json.get("error").is_none(), "unexpected error: {json}");

    for code in ["USA", "DEU"] {
        let points = json["data"]["dataset"]["series"][code].as_array().unwrap();
        let base = points
            .iter()
            .find(|p| p["date"].as_str().unwrap().starts_with("2000"))
            .expect("base year point present");
        assert!((base["value"].as_f64().unwrap() - 100.0).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_gdp_missing_base_year_is_validation_error() {
    let server = mockito::Server::new_async().await;
    let ctx = test_ctx(&server).await;
    let response = gdp::analyze_gdp_cross_country(
        &ctx,
        GdpArgs {
            countries: "USA".to_string(),
            comparison_mode: Some("indexed".to_string()),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert_eq!(json["metadata"]["error_kind"], "VALIDATION");
    assert!(json["error"].as_str().unwrap().contains("base_year"));
}

#[tokio::test]
async fn test_gdp_all_failures_is_no_data_fetched() {
    let mut server = mockito::Server::new_async().await;
    let _catch_all = server
        .mock("GET", "/fred/series/observations")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error_code":400,"error_message":"series does not exist"}"#)
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let response = gdp::analyze_gdp_cross_country(
        &ctx,
        GdpArgs {
            countries: "USA,DEU".to_string(),
            include_population: Some(false),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert_eq!(json["metadata"]["error_kind"], "NO_DATA_FETCHED");
}

#[tokio::test]
async fn test_gdp_unknown_country_in_benchmark_rejected() {
    let server = mockito::Server::new_async().await;
    let ctx = test_ctx(&server).await;
    let response = gdp::analyze_gdp_cross_country(
        &ctx,
        GdpArgs {
            countries: "USA,DEU".to_string(),
            comparison_mode: Some("relative_to_benchmark".to_string()),
            benchmark_against: Some("XYZ".to_string()),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert_eq!(json["metadata"]["error_kind"], "VALIDATION");
    assert!(json["error"].as_str().unwrap().contains("benchmark_against"));
}

// ---------------------------------------------------------------------------
// Network scenarios (run with --ignored against real FRED)
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires network access and FRED_API_KEY"]
async fn test_g7_inflation_snapshot_against_fred() {
    let config = Config::from_env().unwrap();
    let ctx = AppContext::new(config).await.unwrap();
    let response = inflation::compare_inflation_across_regions(
        &ctx,
        InflationArgs {
            regions: "g7".to_string(),
            metric: Some("latest".to_string()),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert!(json.get("error").is_none(), "unexpected error: {json}");
    let warnings = json["data"]["comparability_warnings"].to_string();
    assert!(warnings.contains("Mixed index types"));
}

#[tokio::test]
#[ignore = "requires network access and FRED_API_KEY"]
async fn test_g7_gdp_divergence_1980_2010_against_fred() {
    let config = Config::from_env().unwrap();
    let ctx = AppContext::new(config).await.unwrap();
    let response = gdp::analyze_gdp_cross_country(
        &ctx,
        GdpArgs {
            countries: "g7".to_string(),
            gdp_variants: Some(vec!["per_capita_constant".to_string()]),
            start_date: Some("1980-01-01".to_string()),
            end_date: Some("2010-12-31".to_string()),
            ..Default::default()
        },
    )
    .await;
    let json = wire(&response);
    assert!(json.get("error").is_none(), "unexpected error: {json}");
    let sigma = &json["data"]["analysis"]["convergence"]["sigma"];
    assert!(sigma["slope"].as_f64().unwrap() > 0.0);
    assert!(sigma["p_value"].as_f64().unwrap() < 0.01);
    let beta = &json["data"]["analysis"]["convergence"]["beta"];
    assert_eq!(beta["significant"], false);
}
