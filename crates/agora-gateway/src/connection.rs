use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{error, info, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_types::api::Claims;
use agora_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a connection may stay unidentified.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<std::sync::RwLock<HashSet<Uuid>>>;

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub db: Arc<Database>,
    pub jwt_secret: String,
}

/// Validate an HS256 bearer token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Handle a WebSocket whose token was already validated at the HTTP upgrade.
pub async fn handle_connection_authenticated(socket: WebSocket, ctx: GatewayContext, claims: Claims) {
    let (sender, receiver) = socket.split();
    info!("{} ({}) connected to gateway (pre-authenticated)", claims.username, claims.sub);
    run_connection(sender, receiver, ctx, claims).await;
}

/// Handle a WebSocket that must authenticate with an `Identify` command first.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (sender, mut receiver) = socket.split();

    let Some(claims) = wait_for_identify(&mut receiver, &ctx.jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", claims.username, claims.sub);
    run_connection(sender, receiver, ctx, claims).await;
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            true
        }
    }
}

async fn run_connection(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    claims: Claims,
) {
    let user_id = claims.sub;
    let username = claims.username.clone();

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    // Register per-user channel and send existing online users, then go online
    let (conn_id, mut user_rx) = ctx.dispatcher.register_user_channel(user_id).await;

    for (uid, uname) in ctx.dispatcher.online_users().await {
        let event = GatewayEvent::PresenceUpdate {
            user_id: uid,
            username: uname,
            online: true,
        };
        if !send_event(&mut sender, &event).await {
            ctx.dispatcher.unregister_user_channel(user_id, conn_id).await;
            return;
        }
    }

    // Subscribe before announcing presence so our own update is not missed by others
    let mut broadcast_rx = ctx.dispatcher.subscribe();
    ctx.dispatcher.user_online(user_id, username.clone()).await;

    let subscriptions: Subscriptions = Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;
        // Closed once a newer connection of the same user takes over
        let mut targeted_open = true;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let visible = match send_subscriptions.read() {
                        Ok(subs) => msg.is_visible_to(&subs),
                        Err(_) => break,
                    };
                    if !visible {
                        continue;
                    }

                    if sender.send(Message::Text(msg.json.clone().into())).await.is_err() {
                        break;
                    }
                }
                event = user_rx.recv(), if targeted_open => {
                    let Some(event) = event else {
                        targeted_open = false;
                        continue;
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_ctx, user_id, &recv_username, cmd, &subscriptions).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_username,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.user_offline(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    return verify_token(&token, jwt_secret).ok();
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

async fn handle_command(
    ctx: &GatewayContext,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { channel_ids } => {
            let requested: Vec<String> = channel_ids.iter().map(Uuid::to_string).collect();
            let db = ctx.db.clone();
            let uid = user_id.to_string();
            let readable = tokio::task::spawn_blocking(move || db.readable_channels(&uid, &requested)).await;

            let allowed: HashSet<Uuid> = match readable {
                Ok(Ok(ids)) => ids.iter().filter_map(|id| id.parse().ok()).collect(),
                Ok(Err(e)) => {
                    error!("Failed to resolve readable channels for {}: {}", user_id, e);
                    return;
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return;
                }
            };

            info!(
                "{} ({}) subscribing to {} of {} requested channels",
                username,
                user_id,
                allowed.len(),
                channel_ids.len()
            );
            match subscriptions.write() {
                Ok(mut subs) => *subs = allowed,
                Err(e) => error!("Subscription lock poisoned: {}", e),
            }
        }

        GatewayCommand::StartTyping { channel_id } => {
            let subscribed = subscriptions
                .read()
                .map(|subs| subs.contains(&channel_id))
                .unwrap_or(false);
            if !subscribed {
                return;
            }
            ctx.dispatcher.broadcast(GatewayEvent::TypingStart {
                channel_id,
                user_id,
                username: username.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, exp: usize) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let claims = Claims {
            sub: id,
            username: "ana".into(),
            role: agora_types::models::Role::Admin,
            exp,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();
        (id, token)
    }

    #[test]
    fn test_verify_token() {
        let (id, token) = token("s3cret", usize::MAX / 2);
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, id);
        assert!(claims.is_admin());
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let (_, token) = token("s3cret", 1);
        assert!(verify_token(&token, "s3cret").is_err());
    }

    fn context_with_channels() -> (GatewayContext, Uuid, [Uuid; 3]) {
        let db = Database::open_in_memory().unwrap();
        let ana = Uuid::new_v4();
        let (joined, other, news) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        db.create_channel(&joined.to_string(), "general", "", "group", "root", 0).unwrap();
        db.create_channel(&other.to_string(), "staff", "", "group", "root", 0).unwrap();
        db.create_channel(&news.to_string(), "news", "", "announcement", "root", 0).unwrap();
        db.join_channel(&joined.to_string(), &ana.to_string(), 0).unwrap();

        let ctx = GatewayContext {
            dispatcher: Dispatcher::new(),
            db: Arc::new(db),
            jwt_secret: "s3cret".into(),
        };
        (ctx, ana, [joined, other, news])
    }

    #[tokio::test]
    async fn test_subscribe_keeps_readable_channels() {
        let (ctx, ana, [joined, other, news]) = context_with_channels();
        let subscriptions: Subscriptions = Arc::default();

        let channel_ids = vec![joined, other, news, Uuid::new_v4()];
        handle_command(&ctx, ana, "ana", GatewayCommand::Subscribe { channel_ids }, &subscriptions).await;
        assert_eq!(*subscriptions.read().unwrap(), HashSet::from([joined, news]));

        // A new Subscribe replaces the previous set
        let channel_ids = vec![news];
        handle_command(&ctx, ana, "ana", GatewayCommand::Subscribe { channel_ids }, &subscriptions).await;
        assert_eq!(*subscriptions.read().unwrap(), HashSet::from([news]));
    }

    #[tokio::test]
    async fn test_typing_only_in_subscribed_channels() {
        let (ctx, ana, [joined, other, _]) = context_with_channels();
        let subscriptions: Subscriptions = Arc::default();
        let mut rx = ctx.dispatcher.subscribe();

        let channel_ids = vec![joined, other];
        handle_command(&ctx, ana, "ana", GatewayCommand::Subscribe { channel_ids }, &subscriptions).await;

        handle_command(&ctx, ana, "ana", GatewayCommand::StartTyping { channel_id: other }, &subscriptions).await;
        assert!(rx.try_recv().is_err());

        handle_command(&ctx, ana, "ana", GatewayCommand::StartTyping { channel_id: joined }, &subscriptions).await;
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.channel_id, Some(joined));
        assert!(msg.json.contains("TypingStart"));
    }
}
