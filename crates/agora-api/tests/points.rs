mod common;

use axum::http::StatusCode;
use serde_json::json;

use agora_types::events::GatewayEvent;
use agora_types::models::ConversionStatus;
use common::{TestApp, TestUser, admin, app, user};

const WALLET: &str = "0x2222222222222222222222222222222222222222";

async fn grant(app: &TestApp, root: &TestUser, to: &TestUser, delta: i64) -> serde_json::Value {
    let (status, body) = app
        .post("/points/adjust", root, json!({ "user_id": to.id, "delta": delta, "reason": "beta tester" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
async fn test_adjustments_never_go_negative() {
    let app = app();
    let root = admin("root");
    let bob = user("bob");

    let (_, empty) = app.get("/points/balance", &bob).await;
    assert_eq!(empty["balance"], 0);
    assert!(empty["updated_at"].is_null());

    let balance = grant(&app, &root, &bob, 1500).await;
    assert_eq!(balance["balance"], 1500);

    let (status, _) = app
        .post("/points/adjust", &root, json!({ "user_id": bob.id, "delta": -2000, "reason": "oops" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for delta in [i64::MAX, i64::MIN, 1_000_000_001] {
        let (status, _) = app
            .post("/points/adjust", &root, json!({ "user_id": bob.id, "delta": delta, "reason": "huge" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (_, balance) = app.get("/points/balance", &bob).await;
    assert_eq!(balance["balance"], 1500);

    let (status, _) = app
        .post("/points/adjust", &bob, json!({ "user_id": bob.id, "delta": 10, "reason": "free" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_conversion_workflow() {
    let app = app();
    let root = admin("root");
    let bob = user("bob");
    grant(&app, &root, &bob, 1500).await;

    let (status, _) = app
        .post("/points/conversions", &bob, json!({ "points": 500, "wallet_address": WALLET }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post("/points/conversions", &bob, json!({ "points": 1200, "wallet_address": "0xnope" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, conversion) = app
        .post("/points/conversions", &bob, json!({ "points": 1200, "wallet_address": WALLET }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(conversion["status"], "pending");
    assert_eq!(conversion["token_amount"], 12.0);
    assert_eq!(conversion["rate"], 100);
    let id = conversion["id"].as_str().unwrap().to_string();

    let (_, balance) = app.get("/points/balance", &bob).await;
    assert_eq!(balance["balance"], 300);

    let (status, _) = app.post(&format!("/admin/conversions/{}/approve", id), &bob, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, mut bob_rx) = app.state.dispatcher.register_user_channel(bob.id).await;
    let (status, approved) = app.post(&format!("/admin/conversions/{}/approve", id), &root, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["reviewed_by"], root.id.to_string());
    match bob_rx.try_recv() {
        Ok(GatewayEvent::ConversionUpdated { status, .. }) => assert_eq!(status, ConversionStatus::Approved),
        other => panic!("expected ConversionUpdated, got {:?}", other),
    }

    let (status, _) = app.post(&format!("/admin/conversions/{}/approve", id), &root, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .post(&format!("/admin/conversions/{}/complete", id), &root, json!({ "tx_hash": "0xdead" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let tx_hash = format!("0x{}", "ab".repeat(32));
    let (status, completed) = app
        .post(&format!("/admin/conversions/{}/complete", id), &root, json!({ "tx_hash": tx_hash }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "completed");
    assert_eq!(completed["tx_hash"], tx_hash);

    let (_, mine) = app.get("/points/conversions", &bob).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, _) = app
        .post(&format!("/admin/conversions/{}/approve", uuid::Uuid::new_v4()), &root, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejection_refunds_points() {
    let app = app();
    let root = admin("root");
    let bob = user("bob");
    grant(&app, &root, &bob, 1000).await;

    let (_, conversion) = app
        .post("/points/conversions", &bob, json!({ "points": 1000, "wallet_address": WALLET }))
        .await;
    let id = conversion["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(&format!("/admin/conversions/{}/reject", id), &root, json!({ "reason": "  " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, rejected) = app
        .post(&format!("/admin/conversions/{}/reject", id), &root, json!({ "reason": "duplicate wallet" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["reason"], "duplicate wallet");

    let (_, balance) = app.get("/points/balance", &bob).await;
    assert_eq!(balance["balance"], 1000);
    assert_eq!(balance["lifetime_earned"], 1000);

    let (_, stats) = app.get("/admin/conversions/stats", &root).await;
    let stats = stats.as_array().unwrap();
    assert_eq!(stats.len(), 4);
    let rejected = stats.iter().find(|s| s["status"] == "rejected").unwrap();
    assert_eq!(rejected["count"], 1);
    assert_eq!(rejected["points"], 1000);

    let (_, pending) = app.get("/admin/conversions?status=pending", &root).await;
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_settings() {
    let app = app();
    let root = admin("root");
    let bob = user("bob");
    grant(&app, &root, &bob, 5000).await;

    let (_, settings) = app.get("/points/settings", &bob).await;
    assert_eq!(settings["points_per_token"], 100);
    assert_eq!(settings["enabled"], true);

    let (status, _) = app.call("PUT", "/points/settings", Some(&bob), Some(json!({ "enabled": false }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call("PUT", "/points/settings", Some(&root), Some(json!({ "points_per_token": 0 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app
        .call("PUT", "/points/settings", Some(&root), Some(json!({ "points_per_token": 250, "enabled": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["min_points"], 1000);

    let (status, _) = app
        .post("/points/conversions", &bob, json!({ "points": 1000, "wallet_address": WALLET }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.call("PUT", "/points/settings", Some(&root), Some(json!({ "enabled": true }))).await;
    let (_, conversion) = app
        .post("/points/conversions", &bob, json!({ "points": 1000, "wallet_address": WALLET }))
        .await;
    assert_eq!(conversion["token_amount"], 4.0);
    assert_eq!(conversion["rate"], 250);
}
