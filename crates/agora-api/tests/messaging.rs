mod common;

use axum::http::StatusCode;
use serde_json::json;

use agora_types::events::GatewayEvent;
use common::{app, user};

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = app();
    let (status, body) = app.call("GET", "/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_two_person_conversation_is_reused() {
    let app = app();
    let ana = user("ana");
    let bob = user("bob");

    let (status, first) = app.post("/conversations", &ana, json!({ "participant_ids": [bob.id] })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["participants"].as_array().unwrap().len(), 2);

    let (status, again) = app.post("/conversations", &bob, json!({ "participant_ids": [ana.id, bob.id] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], first["id"]);

    let (status, body) = app.post("/conversations", &ana, json!({ "participant_ids": [ana.id] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_participant_limit() {
    let app = app();
    let ana = user("ana");
    let others: Vec<uuid::Uuid> = (0..50).map(|_| uuid::Uuid::new_v4()).collect();

    let (status, body) = app.post("/conversations", &ana, json!({ "participant_ids": others })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // The caller and repeated ids count once
    let mut full = others[..49].to_vec();
    full.push(ana.id);
    full.push(others[0]);
    let (status, conversation) = app.post("/conversations", &ana, json!({ "participant_ids": full })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(conversation["participants"].as_array().unwrap().len(), 50);
}

#[tokio::test]
async fn test_message_lifecycle() {
    let app = app();
    let ana = user("ana");
    let bob = user("bob");
    let carol = user("carol");

    let (_, conversation) = app.post("/conversations", &ana, json!({ "participant_ids": [bob.id] })).await;
    let cid = conversation["id"].as_str().unwrap().to_string();

    let (_, mut bob_rx) = app.state.dispatcher.register_user_channel(bob.id).await;

    let (status, message) = app
        .post(&format!("/conversations/{}/messages", cid), &ana, json!({ "content": "  hello bob  " }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "hello bob");
    assert_eq!(message["is_deleted"], false);
    assert_eq!(message["read_by"][0]["user_id"], ana.id.to_string());
    let mid = message["id"].as_str().unwrap().to_string();

    match bob_rx.try_recv() {
        Ok(GatewayEvent::DirectMessageCreate { content, sender_id, .. }) => {
            assert_eq!(content, "hello bob");
            assert_eq!(sender_id, ana.id);
        }
        other => panic!("expected DirectMessageCreate, got {:?}", other),
    }

    // Outsiders see nothing
    let (status, _) = app.get(&format!("/conversations/{}", cid), &carol).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .post(&format!("/conversations/{}/messages", cid), &carol, json!({ "content": "hi" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, unread) = app.get("/conversations/unread", &bob).await;
    assert_eq!(unread["unread"], 1);
    let (_, list) = app.get("/conversations", &bob).await;
    assert_eq!(list[0]["unread_count"], 1);
    assert_eq!(list[0]["last_message"]["content"], "hello bob");

    let (status, marked) = app.post(&format!("/conversations/{}/read", cid), &bob, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["marked"], 1);
    let (_, unread) = app.get("/conversations/unread", &bob).await;
    assert_eq!(unread["unread"], 0);

    // Only the sender edits
    let (status, _) = app
        .call("PATCH", &format!("/messages/{}", mid), Some(&bob), Some(json!({ "content": "hijack" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, edited) = app
        .call("PATCH", &format!("/messages/{}", mid), Some(&ana), Some(json!({ "content": "hello, bob" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["content"], "hello, bob");
    assert!(edited["edited_at"].is_string());

    let (status, _) = app.call("DELETE", &format!("/messages/{}", mid), Some(&ana), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("DELETE", &format!("/messages/{}", mid), Some(&ana), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, history) = app.get(&format!("/conversations/{}/messages", cid), &bob).await;
    assert!(history.as_array().unwrap().is_empty());
    let (_, conversation) = app.get(&format!("/conversations/{}", cid), &bob).await;
    assert!(conversation["last_message"].is_null());
}

#[tokio::test]
async fn test_content_rules() {
    let app = app();
    let ana = user("ana");
    let bob = user("bob");
    let (_, conversation) = app.post("/conversations", &ana, json!({ "participant_ids": [bob.id] })).await;
    let uri = format!("/conversations/{}/messages", conversation["id"].as_str().unwrap());

    let (status, _) = app.post(&uri, &ana, json!({ "content": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.post(&uri, &ana, json!({ "content": "x".repeat(5001) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.post(&uri, &ana, json!({ "content": "x".repeat(5000) })).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_history_cursor_and_leave() {
    let app = app();
    let ana = user("ana");
    let bob = user("bob");
    let (_, conversation) = app.post("/conversations", &ana, json!({ "participant_ids": [bob.id] })).await;
    let cid = conversation["id"].as_str().unwrap().to_string();
    let uri = format!("/conversations/{}/messages", cid);

    for text in ["one", "two", "three"] {
        app.post(&uri, &ana, json!({ "content": text })).await;
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
    }

    let (_, page) = app.get(&format!("{}?limit=2", uri), &bob).await;
    let page = page.as_array().unwrap().clone();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["content"], "three");

    let cursor = chrono::DateTime::parse_from_rfc3339(page[1]["created_at"].as_str().unwrap())
        .unwrap()
        .timestamp_millis();
    let (_, older) = app.get(&format!("{}?before={}", uri, cursor), &bob).await;
    assert_eq!(older.as_array().unwrap().len(), 1);
    assert_eq!(older[0]["content"], "one");

    let (status, _) = app.call("DELETE", &format!("/conversations/{}", cid), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/conversations/{}", cid), &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call("DELETE", &format!("/conversations/{}", cid), Some(&ana), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/conversations/{}", cid), &ana).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
