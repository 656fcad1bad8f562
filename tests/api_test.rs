//! HTTP read surface driven through the router without a socket

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use wagerpool::{
    api::{ApiServer, AppState},
    bank::InMemoryBank,
    common::traits::ManualClock,
    config::WagerConfig,
    engine::{Collaborators, NewBet, WagerEngine},
    games::{CoinToss, VrfOracle},
    registry::StaticTokenRegistry,
    Address, Asset, CallContext,
};

fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

struct TestApp {
    app: Router,
    engine: Arc<WagerEngine>,
    oracle: Arc<VrfOracle>,
}

fn test_app() -> TestApp {
    let config = WagerConfig::development();
    let bank = Arc::new(InMemoryBank::new(addr(0xe5c)));
    bank.mint_native(addr(1), 1_000);
    bank.mint_native(addr(2), 1_000);
    let oracle = Arc::new(VrfOracle::from_seed(&[5u8; 32]).unwrap());

    let engine = Arc::new(WagerEngine::new(
        &config,
        Arc::new(CoinToss),
        Collaborators {
            registry: Arc::new(StaticTokenRegistry::from_config(&config.tokens, &config.admin)),
            oracle: oracle.clone(),
            transfers: bank,
            clock: Arc::new(ManualClock::new(1_700_000_000)),
        },
    ));
    let state = Arc::new(AppState {
        engine: engine.clone(),
        node_id: "test-node".to_string(),
        version: "0.0.0".to_string(),
        vrf_public_key: Some(oracle.public_key_hex()),
    });
    TestApp {
        app: ApiServer::new(config.api, state).create_app(),
        engine,
        oracle,
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, request_id, json)
}

#[tokio::test]
async fn test_health_and_status() {
    let t = test_app();

    let (status, request_id, body) = get(&t.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(request_id.is_some());
    assert_eq!(body["status"], "Running");

    let (status, _, body) = get(&t.app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_id"], "test-node");
    assert_eq!(body["game"], "coin_toss");
    assert_eq!(body["paused"], false);
    assert_eq!(body["vrf_public_key"], t.oracle.public_key_hex());
}

#[tokio::test]
async fn test_bet_views_follow_the_lifecycle() {
    let t = test_app();
    let bet_id = t
        .engine
        .create_bet(
            CallContext::new(addr(1)).with_value(100),
            NewBet {
                asset: Asset::Native,
                amount: 100,
                ..Default::default()
            },
        )
        .unwrap();

    let (status, _, body) = get(&t.app, &format!("/bets/{}", bet_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "open");
    assert_eq!(body["max_seats"], 2);

    t.engine
        .join_seats(CallContext::new(addr(2)).with_value(100), bet_id, 1)
        .unwrap();
    for bundle in t.oracle.fulfill_all() {
        t.engine.on_random_fulfilled(bundle.request_id, bundle.output).unwrap();
    }

    let (_, _, body) = get(&t.app, "/bets?limit=5").await;
    assert_eq!(body["total_returned"], 1);
    assert_eq!(body["bets"][0]["status"], "resolved");

    let winner = t.engine.bet(bet_id).unwrap().seats.into_iter().find(|seat| {
        t.engine.payout_balance(seat, &Asset::Native).unwrap() > 0
    });
    let winner = winner.unwrap();
    let (status, _, body) = get(&t.app, &format!("/payouts/{}", winner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balances"][0]["asset"], "native");
    assert_eq!(body["balances"][0]["amount"], 196);

    let (_, _, body) = get(&t.app, "/tokens/native").await;
    assert_eq!(body["house_edge"], 200);
    assert_eq!(body["vrf_fees"], 0);
}

#[tokio::test]
async fn test_errors_carry_request_id() {
    let t = test_app();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bets/42")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["request_id"], "req-42");
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _, body) = get(&t.app, "/payouts/not-an-address").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_metrics_and_pending_refunds() {
    let t = test_app();

    let (status, _, body) = get(&t.app, "/refunds/pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bet_ids"], serde_json::json!([]));

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("wagerpool_bets_created_total"));
}
