pub mod channels;
pub mod conversations;
pub mod convert;
pub mod dex;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod nft;
pub mod points;
pub mod quests;
pub mod router;

use std::sync::Arc;

use serde::Deserialize;
use tracing::error;

use agora_db::Database;
use agora_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

/// `?limit=&offset=` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

/// `?limit=&before=` for message history. `before` is a millisecond cursor.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub before: Option<i64>,
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::from)
}
