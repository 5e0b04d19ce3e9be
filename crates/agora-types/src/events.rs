use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversionStatus, QuestStatus};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },

    /// A user started typing in a community channel
    TypingStart {
        channel_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A community channel was created
    ChannelCreate {
        channel_id: Uuid,
        name: String,
        kind: crate::models::ChannelKind,
    },

    /// A message was posted to a community channel
    ChannelMessageCreate {
        id: Uuid,
        channel_id: Uuid,
        author_id: Uuid,
        author_username: String,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A direct message arrived in a conversation the recipient takes part in
    DirectMessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A direct message was edited or deleted
    DirectMessageUpdate {
        id: Uuid,
        conversation_id: Uuid,
        content: Option<String>,
        deleted: bool,
    },

    /// A participant read the conversation up to now
    DirectMessageRead {
        conversation_id: Uuid,
        user_id: Uuid,
        count: u64,
    },

    /// A swap settled as completed; chart and pair views refresh from this
    SwapCompleted {
        tx_hash: String,
        base: String,
        quote: String,
        price: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    QuestStatusChanged {
        quest_id: Uuid,
        status: QuestStatus,
    },

    /// Sent only to the user who requested the conversion
    ConversionUpdated {
        conversion_id: Uuid,
        status: ConversionStatus,
        tx_hash: Option<String>,
        reason: Option<String>,
    },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are global and should be delivered to all clients.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::TypingStart { channel_id, .. } => Some(*channel_id),
            Self::ChannelMessageCreate { channel_id, .. } => Some(*channel_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Indicate typing in a channel
    StartTyping { channel_id: Uuid },

    /// Replace the set of channels whose scoped events this connection receives.
    Subscribe { channel_ids: Vec<Uuid> },
}
