/// Database row types. These map directly to SQLite rows.
/// Distinct from agora-types API models to keep the DB layer independent.
/// Timestamps are Unix milliseconds.

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub participants: Vec<String>,
    pub last_message: Option<DirectMessageRow>,
    pub last_activity: i64,
    pub created_at: i64,
    /// Unread messages for the user the row was loaded for
    pub unread_count: u64,
}

#[derive(Debug, Clone)]
pub struct DirectMessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub is_deleted: bool,
    pub edited_at: Option<i64>,
    pub created_at: i64,
    /// (user_id, read_at)
    pub read_by: Vec<(String, i64)>,
}

#[derive(Debug, Clone)]
pub struct SwapRow {
    pub tx_hash: String,
    pub user_address: String,
    pub token_in: String,
    pub token_out: String,
    pub base_token: String,
    pub quote_token: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub price: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub gas_used: Option<i64>,
    pub gas_price: Option<f64>,
    pub slippage: f64,
    pub status: String,
    pub block_number: Option<i64>,
    pub timestamp: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct TradingPairRow {
    pub base_token: String,
    pub quote_token: String,
    pub last_price: f64,
    pub total_base_volume: f64,
    pub total_quote_volume: f64,
    pub trade_count: i64,
    pub first_trade_at: i64,
    pub last_trade_at: i64,
}

#[derive(Debug, Clone)]
pub struct TokenPriceRow {
    pub token: String,
    pub counter_token: String,
    pub last_price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub day: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub created_by: String,
    pub created_at: i64,
    pub member_count: u64,
    /// Whether the user the row was loaded for is a member
    pub is_member: bool,
}

#[derive(Debug, Clone)]
pub struct ChannelMessageRow {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct QuestRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward_points: i64,
    pub start_at: i64,
    pub end_at: i64,
    pub status: String,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub participant_count: u64,
    pub tasks: Vec<QuestTaskRow>,
}

#[derive(Debug, Clone)]
pub struct QuestTaskRow {
    pub id: String,
    pub quest_id: String,
    pub title: String,
    pub kind: String,
    pub points: i64,
    pub position: u32,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub quest_id: String,
    pub user_id: String,
    pub joined_at: i64,
    pub points_earned: i64,
    pub completed_at: Option<i64>,
    pub completed_task_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PointsAccountRow {
    pub user_id: String,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ConversionRow {
    pub id: String,
    pub user_id: String,
    pub points: i64,
    pub token_amount: f64,
    pub rate: i64,
    pub wallet_address: String,
    pub status: String,
    pub reason: Option<String>,
    pub tx_hash: Option<String>,
    pub reviewed_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NftVisibilityRow {
    pub contract: String,
    pub token_id: String,
    pub hidden: bool,
    pub featured: bool,
    pub updated_by: String,
    pub updated_at: i64,
}
