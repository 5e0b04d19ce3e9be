//! Row to wire DTO conversions.
//!
//! Stored ids and enum names are trusted but parsed defensively: a corrupt
//! value is logged and replaced rather than failing the whole response.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use agora_db::chart::{Bucket, WindowStats};
use agora_db::models::{
    ChannelMessageRow, ChannelRow, ConversationRow, ConversionRow, DirectMessageRow,
    NftVisibilityRow, ParticipantRow, PointsAccountRow, QuestRow, SwapRow, TokenPriceRow,
    TradingPairRow,
};
use agora_types::api::{
    BalanceResponse, Candle, ChannelMessageResponse, ChannelResponse, ConversationResponse,
    ConversionResponse, DirectMessageResponse, MessagePreview, PairWindowStats,
    QuestProgressResponse, QuestResponse, QuestTaskResponse, ReadReceipt, SwapResponse,
    TokenPriceResponse, TradingPairResponse, VisibilityResponse,
};

pub fn datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub fn id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        Uuid::default()
    })
}

fn text<T>(raw: &str) -> T
where
    T: FromStr + Default,
    T::Err: Display,
{
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt stored value: {}", e);
        T::default()
    })
}

fn ids(raw: &[String]) -> Vec<Uuid> {
    raw.iter().map(|s| id(s)).collect()
}

// -- Messaging --

pub fn conversation(row: ConversationRow) -> ConversationResponse {
    ConversationResponse {
        id: id(&row.id),
        participants: ids(&row.participants),
        last_message: row.last_message.map(|m| MessagePreview {
            message_id: id(&m.id),
            sender_id: id(&m.sender_id),
            content: m.content,
            created_at: datetime(m.created_at),
        }),
        last_activity: datetime(row.last_activity),
        created_at: datetime(row.created_at),
        unread_count: row.unread_count,
    }
}

pub fn direct_message(row: DirectMessageRow) -> DirectMessageResponse {
    DirectMessageResponse {
        id: id(&row.id),
        conversation_id: id(&row.conversation_id),
        sender_id: id(&row.sender_id),
        sender_username: row.sender_username,
        content: row.content,
        read_by: row
            .read_by
            .iter()
            .map(|(user_id, read_at)| ReadReceipt {
                user_id: id(user_id),
                read_at: datetime(*read_at),
            })
            .collect(),
        is_deleted: row.is_deleted,
        edited_at: row.edited_at.map(datetime),
        created_at: datetime(row.created_at),
    }
}

// -- DEX --

pub fn swap(row: SwapRow) -> SwapResponse {
    SwapResponse {
        tx_hash: row.tx_hash,
        user_address: row.user_address,
        token_in: row.token_in,
        token_out: row.token_out,
        amount_in: row.amount_in,
        amount_out: row.amount_out,
        gas_used: row.gas_used.and_then(|g| u64::try_from(g).ok()),
        gas_price: row.gas_price,
        slippage: row.slippage,
        status: text(&row.status),
        block_number: row.block_number.and_then(|b| u64::try_from(b).ok()),
        timestamp: datetime(row.timestamp),
        created_at: datetime(row.created_at),
        updated_at: datetime(row.updated_at),
    }
}

pub fn candle(bucket: &Bucket) -> Candle {
    Candle {
        time: datetime(bucket.start),
        open: bucket.open,
        high: bucket.high,
        low: bucket.low,
        close: bucket.close,
        volume: bucket.volume,
        quote_volume: bucket.quote_volume,
        trades: bucket.trades,
    }
}

pub fn trading_pair(row: TradingPairRow, stats: Option<WindowStats>) -> TradingPairResponse {
    TradingPairResponse {
        base: row.base_token,
        quote: row.quote_token,
        last_price: row.last_price,
        total_base_volume: row.total_base_volume,
        total_quote_volume: row.total_quote_volume,
        trade_count: u64::try_from(row.trade_count).unwrap_or_default(),
        first_trade_at: datetime(row.first_trade_at),
        last_trade_at: datetime(row.last_trade_at),
        stats_24h: stats.map(|s| PairWindowStats {
            volume: s.volume,
            quote_volume: s.quote_volume,
            high: s.high,
            low: s.low,
            trades: s.trades,
            price_change_pct: s.price_change_pct,
        }),
    }
}

pub fn token_price(row: TokenPriceRow) -> TokenPriceResponse {
    let change_pct = if row.open_price > 0.0 {
        (row.last_price - row.open_price) / row.open_price * 100.0
    } else {
        0.0
    };
    TokenPriceResponse {
        token: row.token,
        counter_token: row.counter_token,
        last_price: row.last_price,
        open: row.open_price,
        high: row.high_price,
        low: row.low_price,
        change_pct,
        day: row.day,
        updated_at: datetime(row.updated_at),
    }
}

// -- Community --

pub fn channel(row: ChannelRow) -> ChannelResponse {
    ChannelResponse {
        id: id(&row.id),
        name: row.name,
        description: row.description,
        kind: text(&row.kind),
        created_by: id(&row.created_by),
        member_count: row.member_count,
        is_member: row.is_member,
        created_at: datetime(row.created_at),
    }
}

pub fn channel_message(row: ChannelMessageRow) -> ChannelMessageResponse {
    ChannelMessageResponse {
        id: id(&row.id),
        channel_id: id(&row.channel_id),
        author_id: id(&row.author_id),
        author_username: row.author_username,
        content: row.content,
        created_at: datetime(row.created_at),
    }
}

// -- Quests --

pub fn quest(row: QuestRow) -> QuestResponse {
    QuestResponse {
        id: id(&row.id),
        title: row.title,
        description: row.description,
        reward_points: row.reward_points,
        start_at: datetime(row.start_at),
        end_at: datetime(row.end_at),
        status: text(&row.status),
        created_by: id(&row.created_by),
        tasks: row
            .tasks
            .into_iter()
            .map(|t| QuestTaskResponse {
                id: id(&t.id),
                title: t.title,
                kind: t.kind,
                points: t.points,
                position: t.position,
            })
            .collect(),
        participant_count: row.participant_count,
        created_at: datetime(row.created_at),
        updated_at: datetime(row.updated_at),
    }
}

pub fn progress(row: ParticipantRow, total_tasks: u64) -> QuestProgressResponse {
    QuestProgressResponse {
        quest_id: id(&row.quest_id),
        user_id: id(&row.user_id),
        joined_at: datetime(row.joined_at),
        completed_task_ids: ids(&row.completed_task_ids),
        total_tasks,
        points_earned: row.points_earned,
        completed_at: row.completed_at.map(datetime),
    }
}

// -- Points --

pub fn balance(user_id: Uuid, row: Option<PointsAccountRow>) -> BalanceResponse {
    match row {
        Some(row) => BalanceResponse {
            user_id,
            balance: row.balance,
            lifetime_earned: row.lifetime_earned,
            updated_at: Some(datetime(row.updated_at)),
        },
        None => BalanceResponse {
            user_id,
            balance: 0,
            lifetime_earned: 0,
            updated_at: None,
        },
    }
}

pub fn conversion(row: ConversionRow) -> ConversionResponse {
    ConversionResponse {
        id: id(&row.id),
        user_id: id(&row.user_id),
        points: row.points,
        token_amount: row.token_amount,
        rate: row.rate,
        wallet_address: row.wallet_address,
        status: text(&row.status),
        reason: row.reason,
        tx_hash: row.tx_hash,
        reviewed_by: row.reviewed_by.as_deref().map(id),
        created_at: datetime(row.created_at),
        updated_at: datetime(row.updated_at),
    }
}

// -- NFT --

pub fn visibility(row: NftVisibilityRow) -> VisibilityResponse {
    VisibilityResponse {
        contract: row.contract,
        token_id: row.token_id,
        hidden: row.hidden,
        featured: row.featured,
        updated_by: id(&row.updated_by),
        updated_at: datetime(row.updated_at),
    }
}
