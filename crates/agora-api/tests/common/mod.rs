#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use agora_api::router::router;
use agora_api::{AppState, AppStateInner};
use agora_db::Database;
use agora_gateway::dispatcher::Dispatcher;
use agora_types::api::{Claims, ConversionSettings};
use agora_types::models::Role;

pub const SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

pub fn app() -> TestApp {
    let db = Database::open_in_memory().unwrap();
    db.seed_conversion_settings(&ConversionSettings {
        points_per_token: 100,
        min_points: 1000,
        enabled: true,
    })
    .unwrap();

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: SECRET.to_string(),
        dispatcher: Dispatcher::new(),
    });
    TestApp {
        router: router(state.clone()),
        state,
    }
}

fn mint(username: &str, role: Role) -> TestUser {
    let id = Uuid::new_v4();
    let claims = Claims {
        sub: id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
    TestUser { id, token }
}

pub fn user(username: &str) -> TestUser {
    mint(username, Role::User)
}

pub fn admin(username: &str) -> TestUser {
    mint(username, Role::Admin)
}

impl TestApp {
    /// Sends one request and returns the status with the JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn call(&self, method: &str, uri: &str, who: Option<&TestUser>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = who {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, who: &TestUser) -> (StatusCode, Value) {
        self.call("GET", uri, Some(who), None).await
    }

    pub async fn post(&self, uri: &str, who: &TestUser, body: Value) -> (StatusCode, Value) {
        self.call("POST", uri, Some(who), Some(body)).await
    }
}
