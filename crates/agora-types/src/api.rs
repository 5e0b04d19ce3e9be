use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ChannelKind, ChartInterval, ConversionStatus, QuestStatus, Role, SwapStatus,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
/// Tokens are minted by the auth service with the same secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePreview {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    pub last_message: Option<MessagePreview>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadResponse {
    pub unread: u64,
}

// -- Direct messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DirectMessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub read_by: Vec<ReadReceipt>,
    pub is_deleted: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}

// -- DEX --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordSwapRequest {
    pub tx_hash: String,
    pub user_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub gas_used: Option<u64>,
    /// Gas price in gwei
    pub gas_price: Option<f64>,
    /// Slippage tolerance in percent
    #[serde(default)]
    pub slippage: f64,
    pub status: Option<SwapStatus>,
    pub block_number: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSwapStatusRequest {
    pub status: SwapStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwapResponse {
    pub tx_hash: String,
    pub user_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub gas_used: Option<u64>,
    pub gas_price: Option<f64>,
    pub slippage: f64,
    pub status: SwapStatus,
    pub block_number: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base-token volume
    pub volume: f64,
    pub quote_volume: f64,
    pub trades: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChartResponse {
    pub base: String,
    pub quote: String,
    pub interval: ChartInterval,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub candles: Vec<Candle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairWindowStats {
    pub volume: f64,
    pub quote_volume: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub trades: u64,
    pub price_change_pct: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TradingPairResponse {
    pub base: String,
    pub quote: String,
    pub last_price: f64,
    pub total_base_volume: f64,
    pub total_quote_volume: f64,
    pub trade_count: u64,
    pub first_trade_at: DateTime<Utc>,
    pub last_trade_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_24h: Option<PairWindowStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPriceResponse {
    pub token: String,
    /// Token the price is denominated in
    pub counter_token: String,
    pub last_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub change_pct: f64,
    pub day: String,
    pub updated_at: DateTime<Utc>,
}

// -- Community channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ChannelKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: ChannelKind,
    pub created_by: Uuid,
    pub member_count: u64,
    pub is_member: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostChannelMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelMessageResponse {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// -- Quests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateQuestRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reward_points: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateQuestRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub reward_points: Option<i64>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTaskRequest {
    pub title: String,
    pub kind: String,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestTransitionRequest {
    pub status: QuestStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestTaskResponse {
    pub id: Uuid,
    pub title: String,
    pub kind: String,
    pub points: i64,
    pub position: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub reward_points: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: QuestStatus,
    pub created_by: Uuid,
    pub tasks: Vec<QuestTaskResponse>,
    pub participant_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestProgressResponse {
    pub quest_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub completed_task_ids: Vec<Uuid>,
    pub total_tasks: u64,
    pub points_earned: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

// -- Points --

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustPointsRequest {
    pub user_id: Uuid,
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConversionRequest {
    pub points: i64,
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectConversionRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteConversionRequest {
    pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub points: i64,
    pub token_amount: f64,
    /// Points per token at request time
    pub rate: i64,
    pub wallet_address: String,
    pub status: ConversionStatus,
    pub reason: Option<String>,
    pub tx_hash: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversionStatsEntry {
    pub status: ConversionStatus,
    pub count: u64,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub points_per_token: i64,
    pub min_points: i64,
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSettingsRequest {
    pub points_per_token: Option<i64>,
    pub min_points: Option<i64>,
    pub enabled: Option<bool>,
}

// -- NFT marketplace metadata --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetVisibilityRequest {
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisibilityResponse {
    pub contract: String,
    pub token_id: String,
    pub hidden: bool,
    pub featured: bool,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenIdsResponse {
    pub contract: Option<String>,
    pub token_ids: Vec<String>,
}
