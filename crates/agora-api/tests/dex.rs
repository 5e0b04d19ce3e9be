mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};

use common::{app, user};

const TOKEN_A: &str = "0x000000000000000000000000000000000000000a";
const TOKEN_B: &str = "0x000000000000000000000000000000000000000B";
const TRADER: &str = "0x1111111111111111111111111111111111111111";

fn hash(n: u8) -> String {
    format!("0x{}", format!("{:02x}", n).repeat(32))
}

fn swap(tx: &str, token_in: &str, token_out: &str, amount_in: f64, amount_out: f64, status: &str) -> Value {
    json!({
        "tx_hash": tx,
        "user_address": TRADER,
        "token_in": token_in,
        "token_out": token_out,
        "amount_in": amount_in,
        "amount_out": amount_out,
        "gas_used": 150000,
        "gas_price": 12.5,
        "slippage": 0.5,
        "status": status,
    })
}

#[tokio::test]
async fn test_record_swap_validation() {
    let app = app();
    let ana = user("ana");

    let (status, _) = app.post("/dex/swaps", &ana, swap("0x1234", TOKEN_A, TOKEN_B, 1.0, 2.0, "pending")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/dex/swaps", &ana, swap(&hash(1), TOKEN_A, TOKEN_A, 1.0, 2.0, "pending")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/dex/swaps", &ana, swap(&hash(1), TOKEN_A, TOKEN_B, 0.0, 2.0, "pending")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_slippage = swap(&hash(1), TOKEN_A, TOKEN_B, 1.0, 2.0, "pending");
    bad_slippage["slippage"] = json!(150.0);
    let (status, _) = app.post("/dex/swaps", &ana, bad_slippage).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, recorded) = app.post("/dex/swaps", &ana, swap(&hash(1), TOKEN_A, TOKEN_B, 1.0, 2.0, "pending")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recorded["status"], "pending");
    assert_eq!(recorded["token_out"], TOKEN_B.to_lowercase());

    let (status, body) = app.post("/dex/swaps", &ana, swap(&hash(1), TOKEN_A, TOKEN_B, 1.0, 2.0, "pending")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_status_settles_once() {
    let app = app();
    let ana = user("ana");
    app.post("/dex/swaps", &ana, swap(&hash(2), TOKEN_A, TOKEN_B, 1.0, 2.0, "pending")).await;
    let uri = format!("/dex/swaps/{}", hash(2));

    let (status, settled) = app
        .call("PATCH", &uri, Some(&ana), Some(json!({ "status": "failed", "block_number": 42 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["status"], "failed");
    assert_eq!(settled["block_number"], 42);

    let (status, _) = app.call("PATCH", &uri, Some(&ana), Some(json!({ "status": "completed" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call("PATCH", &format!("/dex/swaps/{}", hash(3)), Some(&ana), Some(json!({ "status": "completed" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Failed swaps never reach the pair aggregate
    let (status, _) = app.get(&format!("/dex/pairs/{}/{}", TOKEN_A, TOKEN_B), &ana).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_completed_swaps_feed_analytics() {
    let app = app();
    let ana = user("ana");
    let mut events = app.state.dispatcher.subscribe();

    // Sell 200 B for 100 A: price of A is 2 B
    let (status, _) = app.post("/dex/swaps", &ana, swap(&hash(4), TOKEN_B, TOKEN_A, 200.0, 100.0, "completed")).await;
    assert_eq!(status, StatusCode::CREATED);
    let event = events.recv().await.unwrap();
    assert!(event.json.contains("SwapCompleted"));

    // Sell 50 A for 150 B, settled later: price 3
    app.post("/dex/swaps", &ana, swap(&hash(5), TOKEN_A, TOKEN_B, 50.0, 150.0, "pending")).await;
    let (status, _) = app
        .call("PATCH", &format!("/dex/swaps/{}", hash(5)), Some(&ana), Some(json!({ "status": "completed" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Either order of the pair resolves to the canonical one
    let (status, pair) = app.get(&format!("/dex/pairs/{}/{}", TOKEN_B, TOKEN_A), &ana).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pair["base"], TOKEN_A);
    assert_eq!(pair["quote"], TOKEN_B.to_lowercase());
    assert_eq!(pair["trade_count"], 2);
    assert_eq!(pair["last_price"], 3.0);
    assert_eq!(pair["total_base_volume"], 150.0);
    assert_eq!(pair["stats_24h"]["trades"], 2);
    assert_eq!(pair["stats_24h"]["high"], 3.0);
    assert_eq!(pair["stats_24h"]["price_change_pct"], 50.0);

    let (_, pairs) = app.get("/dex/pairs", &ana).await;
    assert_eq!(pairs.as_array().unwrap().len(), 1);
    assert!(pairs[0].get("stats_24h").is_none());

    let now = chrono::Utc::now().timestamp_millis();
    let (status, chart) = app
        .get(
            &format!("/dex/pairs/{}/{}/chart?interval=1h&from={}&to={}", TOKEN_A, TOKEN_B, now - 7_200_000, now + 3_600_000),
            &ana,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let candles = chart["candles"].as_array().unwrap();
    let trades: u64 = candles.iter().map(|c| c["trades"].as_u64().unwrap()).sum();
    assert_eq!(trades, 2);
    assert_eq!(candles.last().unwrap()["close"], 3.0);

    let (status, price) = app.get(&format!("/dex/tokens/{}/price", TOKEN_A), &ana).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(price["last_price"], 3.0);
    assert_eq!(price["counter_token"], TOKEN_B.to_lowercase());

    let (_, mine) = app
        .get(&format!("/dex/users/{}/swaps?status=completed", TRADER), &ana)
        .await;
    assert_eq!(mine.as_array().unwrap().len(), 2);
    let (_, recent) = app.get("/dex/swaps/recent?limit=1", &ana).await;
    assert_eq!(recent.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_chart_request_rules() {
    let app = app();
    let ana = user("ana");
    let base = format!("/dex/pairs/{}/{}/chart", TOKEN_A, TOKEN_B);

    let (status, _) = app.get(&format!("{}?interval=2h", base), &ana).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(&format!("{}?interval=1h&from=2000&to=1000", base), &ana).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(&format!("{}?interval=1m&from=0&to=86400000", base), &ana).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .get(&format!("{}?from={}&to={}", base, i64::MIN, i64::MAX), &ana)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    let (status, _) = app.get(&format!("{}?to={}", base, i64::MIN), &ana).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, chart) = app.get(&format!("{}?interval=1m", base), &ana).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chart["interval"], "1m");
    assert!(chart["candles"].as_array().unwrap().is_empty());

    let (status, _) = app.get(&format!("/dex/tokens/{}/price", TOKEN_A), &ana).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
