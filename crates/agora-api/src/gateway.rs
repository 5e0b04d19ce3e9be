use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use agora_gateway::connection::{self, GatewayContext, verify_token};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade. With `?token=` the connection is authenticated up
/// front; otherwise the client must send `Identify` first.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let ctx = GatewayContext {
        dispatcher: state.dispatcher.clone(),
        db: state.db.clone(),
        jwt_secret: state.jwt_secret.clone(),
    };

    match query.token {
        Some(token) => {
            let claims = verify_token(&token, &state.jwt_secret).map_err(|e| {
                debug!("Rejected gateway token: {}", e);
                ApiError::Unauthorized
            })?;
            Ok(ws.on_upgrade(move |socket| connection::handle_connection_authenticated(socket, ctx, claims)))
        }
        None => Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))),
    }
}
