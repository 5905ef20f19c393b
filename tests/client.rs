//! FRED client pipeline tests against a mock HTTP server: caching, retry
//! policy, rate-limit coordination, and typed errors.

use std::time::Duration;

use fred_query::cache::ns;
use fred_query::error::{ErrorKind, FredQueryError};
use fred_query::{AppContext, Config};
use mockito::Matcher;

async fn test_ctx(server: &mockito::ServerGuard) -> AppContext {
    let config = Config::builder("test-key")
        .base_url(server.url())
        .timeout(Duration::from_secs(5))
        .rate_limit(120, Duration::from_secs(60))
        .build();
    AppContext::new(config).await.unwrap()
}

fn search_body() -> String {
    serde_json::json!({
        "count": 1,
        "seriess": [{
            "id": "UNRATE",
            "title": "Unemployment Rate",
            "frequency": "Monthly",
            "frequency_short": "M",
            "units": "Percent",
            "units_short": "%",
            "popularity": 94
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_cache_miss_then_hit_is_byte_identical() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/fred/series/search")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(search_body())
        .expect(1)
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let params: Vec<(&str, Option<String>)> =
        vec![("search_text", Some("unemployment".to_string()))];

    let (first, meta1) = ctx
        .client
        .get_json("search_fred_series", "fred/series/search", &params, ns::SEARCH, None)
        .await
        .unwrap();
    assert!(!meta1.cache_hit);

    let (second, meta2) = ctx
        .client
        .get_json("search_fred_series", "fred/series/search", &params, ns::SEARCH, None)
        .await
        .unwrap();
    assert!(meta2.cache_hit);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    // Exactly one upstream request; the second call was served from cache
    mock.assert_async().await;
    let hits = ctx
        .telemetry
        .cache_hits_total
        .with_label_values(&[ns::SEARCH])
        .get();
    assert_eq!(hits as i64, 1);
}

#[tokio::test]
async fn test_param_permutation_collapses_to_one_cache_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/fred/series/search")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(search_body())
        .expect(1)
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let forward: Vec<(&str, Option<String>)> = vec![
        ("search_text", Some("cpi".to_string())),
        ("limit", Some("10".to_string())),
    ];
    let reversed: Vec<(&str, Option<String>)> = vec![
        ("limit", Some("10".to_string())),
        ("search_text", Some("cpi".to_string())),
    ];

    ctx.client
        .get_json("search_fred_series", "fred/series/search", &forward, ns::SEARCH, None)
        .await
        .unwrap();
    let (_, meta) = ctx
        .client
        .get_json("search_fred_series", "fred/series/search", &reversed, ns::SEARCH, None)
        .await
        .unwrap();
    assert!(meta.cache_hit, "permuted params must hit the same cache entry");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retries_on_5xx_then_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("GET", "/fred/series/search")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    let ctx = test_ctx(&server).await;

    let params: Vec<(&str, Option<String>)> = vec![("search_text", Some("gdp".to_string()))];
    // First two attempts fail; swap in a healthy mock before the third
    let handle = {
        let client = &ctx.client;
        let params = params.clone();
        async move {
            client
                .get_json("search_fred_series", "fred/series/search", &params, ns::SEARCH, None)
                .await
        }
    };
    let succeed_later = async {
        // After the second attempt (~1.2s worst case), before the third (~2.4s)
        tokio::time::sleep(Duration::from_millis(1_800)).await;
        failing.remove_async().await;
        server
            .mock("GET", "/fred/series/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(search_body())
            .create_async()
            .await
    };
    let (result, _mock) = tokio::join!(handle, succeed_later);

    let (_, meta) = result.expect("third attempt should succeed");
    assert_eq!(meta.retry_count, 2);
    let retries = ctx
        .telemetry
        .retries_total
        .with_label_values(&["search_fred_series"])
        .get();
    assert_eq!(retries as i64, 2);
}

#[tokio::test]
async fn test_5xx_exhaustion_returns_typed_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/fred/series/search")
        .match_query(Matcher::Any)
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let params: Vec<(&str, Option<String>)> = vec![("search_text", Some("x".to_string()))];
    let err = ctx
        .client
        .get_json("search_fred_series", "fred/series/search", &params, ns::SEARCH, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream5xx);
    assert!(matches!(err, FredQueryError::ServerError { status: 500, .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_4xx_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/fred/series/observations")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(
            serde_json::json!({
                "error_code": 400,
                "error_message": "Bad Request. The series does not exist."
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let params: Vec<(&str, Option<String>)> =
        vec![("series_id", Some("NOPE".to_string()))];
    let err = ctx
        .client
        .get_json(
            "get_fred_series_observations",
            "fred/series/observations",
            &params,
            ns::OBSERVATIONS,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream4xx);
    assert!(err.to_string().contains("does not exist"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_429_installs_limiter_penalty_then_recovers() {
    let mut server = mockito::Server::new_async().await;
    let throttled = server
        .mock("GET", "/fred/series/search")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(1)
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let params: Vec<(&str, Option<String>)> = vec![("search_text", Some("m2".to_string()))];

    let request = {
        let client = &ctx.client;
        let params = params.clone();
        async move {
            client
                .get_json("search_fred_series", "fred/series/search", &params, ns::SEARCH, None)
                .await
        }
    };
    let recover = async {
        // Before the first retry fires (earliest ~800ms)
        tokio::time::sleep(Duration::from_millis(500)).await;
        throttled.remove_async().await;
        server
            .mock("GET", "/fred/series/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(search_body())
            .create_async()
            .await
    };
    let (result, _mock) = tokio::join!(request, recover);

    let (_, meta) = result.expect("request should recover after the 429");
    assert!(meta.retry_count >= 1);
    // Success cleared the penalty
    let snap = ctx.limiter.snapshot();
    assert_eq!(snap["active_penalty_ms"], 0);
    assert!(snap["last_429_at"].is_string());
}

#[tokio::test]
async fn test_observations_are_sorted_and_missing_filtered() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/fred/series/observations")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            serde_json::json!({
                "observations": [
                    {"date": "2020-03-01", "value": "3.3"},
                    {"date": "2020-01-01", "value": "1.1"},
                    {"date": "2020-02-01", "value": "."},
                    {"date": "2020-04-01", "value": "4.4"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let ctx = test_ctx(&server).await;
    let series = ctx
        .client
        .observations("test", "CPIAUCSL", None, None, None, None)
        .await
        .unwrap();

    let dates: Vec<&str> = series.observations.iter().map(|o| o.date.as_str()).collect();
    assert_eq!(
        dates,
        vec!["2020-01-01", "2020-02-01", "2020-03-01", "2020-04-01"]
    );
    assert_eq!(series.observations[1].value, None);
    let present: Vec<f64> = series.present().map(|(_, v)| v).collect();
    assert_eq!(present, vec![1.1, 3.3, 4.4]);
}

#[tokio::test]
async fn test_limiter_bounds_concurrent_fanout() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/fred/series/search")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(search_body())
        .expect_at_least(8)
        .create_async()
        .await;

    // Small window so the test stays fast: 4 requests per 500ms
    let config = Config::builder("test-key")
        .base_url(server.url())
        .rate_limit(4, Duration::from_millis(500))
        .build();
    let ctx = std::sync::Arc::new(AppContext::new(config).await.unwrap());

    let started = std::time::Instant::now();
    let mut handles = Vec::new();
    for i in 0..8 {
        let ctx = std::sync::Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            let params: Vec<(&str, Option<String>)> =
                vec![("search_text", Some(format!("distinct-{i}")))];
            ctx.client
                .get_json("search_fred_series", "fred/series/search", &params, ns::SEARCH, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("all calls eventually succeed");
    }

    // 8 distinct requests through a 4-per-window limiter need a second window
    assert!(
        started.elapsed() >= Duration::from_millis(500),
        "fanout finished too fast to have respected the window"
    );
    let blocks = ctx.telemetry.rate_limit_blocks_total.get();
    assert!(blocks >= 1.0, "some acquires must have waited");
}
