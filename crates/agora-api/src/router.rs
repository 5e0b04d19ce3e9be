use axum::{
    Json, Router, middleware,
    routing::{get, patch, post, put},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::{AppState, channels, conversations, dex, gateway, messages, nft, points, quests};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Full HTTP surface. Everything except `/health` and `/gateway` needs a
/// bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        // Direct messaging
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversations/unread", get(conversations::unread_total))
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation).delete(conversations::leave_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/conversations/{id}/read", post(messages::mark_read))
        .route(
            "/messages/{id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        // DEX
        .route("/dex/swaps", post(dex::record_swap))
        .route("/dex/swaps/recent", get(dex::list_recent_swaps))
        .route(
            "/dex/swaps/{tx_hash}",
            get(dex::get_swap).patch(dex::update_swap_status),
        )
        .route("/dex/users/{address}/swaps", get(dex::list_user_swaps))
        .route("/dex/pairs", get(dex::list_pairs))
        .route("/dex/pairs/{a}/{b}", get(dex::get_pair))
        .route("/dex/pairs/{a}/{b}/chart", get(dex::chart))
        .route("/dex/tokens/{address}/price", get(dex::token_price))
        // Community
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route("/channels/{id}/join", post(channels::join_channel))
        .route("/channels/{id}/leave", post(channels::leave_channel))
        .route(
            "/channels/{id}/messages",
            get(channels::get_messages).post(channels::post_message),
        )
        // Quests
        .route("/quests", get(quests::list_quests).post(quests::create_quest))
        .route("/quests/{id}", get(quests::get_quest).patch(quests::update_quest))
        .route("/quests/{id}/tasks", post(quests::add_task))
        .route("/quests/{id}/status", post(quests::transition))
        .route("/quests/{id}/join", post(quests::join_quest))
        .route("/quests/{id}/progress", get(quests::get_progress))
        .route("/quests/{id}/tasks/{task_id}/complete", post(quests::complete_task))
        .route("/quests/{id}/participants", get(quests::list_participants))
        // Points
        .route("/points/balance", get(points::get_balance))
        .route("/points/adjust", post(points::adjust_points))
        .route(
            "/points/conversions",
            get(points::list_my_conversions).post(points::request_conversion),
        )
        .route(
            "/points/settings",
            get(points::get_settings).put(points::update_settings),
        )
        .route("/admin/conversions", get(points::list_conversions))
        .route("/admin/conversions/stats", get(points::conversion_stats))
        .route("/admin/conversions/{id}/approve", post(points::approve_conversion))
        .route("/admin/conversions/{id}/reject", post(points::reject_conversion))
        .route("/admin/conversions/{id}/complete", post(points::complete_conversion))
        // NFT marketplace
        .route("/nft/visibility", get(nft::list_visibility))
        .route("/nft/featured", get(nft::featured_tokens))
        .route("/nft/{contract}/hidden", get(nft::hidden_tokens))
        .route(
            "/nft/{contract}/{token_id}/visibility",
            put(nft::set_visibility).delete(nft::clear_visibility),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/gateway", get(gateway::ws_upgrade))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
