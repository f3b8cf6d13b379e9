//! Price lookups against a mock price endpoint.

mod common;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use realm_assets::core::pricing::{PRICE_STAGE, PriceService};
use realm_assets::test_utils::make_test_pubkey;

use common::fixtures::RealmFixture;
use common::logger::TestLogger;

#[tokio::test]
async fn prices_are_fetched_once_and_cached() {
    let log = TestLogger::new("prices_are_fetched_once_and_cached");
    let (priced, unpriced) = (make_test_pubkey(900), make_test_pubkey(901));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/price"))
        .and(query_param("ids", format!("{priced},{unpriced}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                priced.to_string(): { "id": priced.to_string(), "price": "1.25" },
                unpriced.to_string(): null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = PriceService::new(format!("{}/v4/price", server.uri())).unwrap();
    let first = service.fetch_prices(&[priced, unpriced]).await;
    assert!(first.is_complete());
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].usd, 1.25);

    // Both mints, priced or not, are answered from the cache.
    let second = service.fetch_prices(&[priced, unpriced]).await;
    assert_eq!(second.items, first.items);
    assert_eq!(service.cached(&priced).await, Some(1.25));
    assert_eq!(service.cached(&unpriced).await, None);
    log.finish_ok();
}

#[tokio::test]
async fn failed_lookup_becomes_a_warning() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let service = PriceService::new(server.uri()).unwrap();
    let mint = make_test_pubkey(900);
    let partial = service.fetch_prices(&[mint]).await;

    assert!(partial.items.is_empty());
    assert_eq!(partial.warnings.len(), 1);
    assert_eq!(partial.warnings[0].stage, PRICE_STAGE);
    assert_eq!(partial.warnings[0].addresses, vec![mint]);
    // Not cached, so the next scan asks again.
    assert_eq!(service.cached(&mint).await, None);
}

#[tokio::test]
async fn aggregation_attaches_prices_to_the_report() {
    let log = TestLogger::new("aggregation_attaches_prices_to_the_report");
    let fx = RealmFixture::new(1);
    let mint = make_test_pubkey(900);
    fx.cluster.insert_mint(&mint, None, 5_000_000, 6);
    fx.cluster
        .insert_token_account(&make_test_pubkey(300), &mint, &fx.treasury(0), 2_000_000, false);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("ids", mint.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { mint.to_string(): { "price": 0.5 } }
        })))
        .mount(&server)
        .await;

    let service = Arc::new(PriceService::new(server.uri()).unwrap());
    let report = fx
        .aggregator()
        .with_prices(service)
        .load_realm_assets(&fx.realm, &fx.governances)
        .await
        .unwrap();

    assert_eq!(report.price_of(&mint), Some(0.5));
    assert!(report.is_complete());
    log.finish_ok();
}

#[tokio::test]
async fn unreachable_price_endpoint_keeps_the_scan_complete() {
    let fx = RealmFixture::new(1);
    let mint = make_test_pubkey(900);
    fx.cluster.insert_mint(&mint, None, 5_000_000, 6);
    fx.cluster
        .insert_token_account(&make_test_pubkey(300), &mint, &fx.treasury(0), 2_000_000, false);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let report = fx
        .aggregator()
        .with_prices(Arc::new(PriceService::new(server.uri()).unwrap()))
        .load_realm_assets(&fx.realm, &fx.governances)
        .await
        .unwrap();

    assert_eq!(report.price_of(&mint), None);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.is_complete());
}
