use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored
/// as lowercase text in the database.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

text_enum!(Role { User => "user", Admin => "admin" });

// -- DEX --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

text_enum!(SwapStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

impl SwapStatus {
    /// A swap settles exactly once: pending may become completed or failed.
    pub fn can_transition_to(self, next: SwapStatus) -> bool {
        matches!(
            (self, next),
            (SwapStatus::Pending, SwapStatus::Completed) | (SwapStatus::Pending, SwapStatus::Failed)
        )
    }
}

/// Fixed chart bucket widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

text_enum!(ChartInterval {
    OneMinute => "1m",
    FiveMinutes => "5m",
    FifteenMinutes => "15m",
    OneHour => "1h",
    FourHours => "4h",
    OneDay => "1d",
});

impl ChartInterval {
    pub fn as_millis(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Self::OneMinute => MINUTE,
            Self::FiveMinutes => 5 * MINUTE,
            Self::FifteenMinutes => 15 * MINUTE,
            Self::OneHour => 60 * MINUTE,
            Self::FourHours => 240 * MINUTE,
            Self::OneDay => 1440 * MINUTE,
        }
    }
}

// -- Community --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Members chat with each other.
    #[default]
    Group,
    /// Everyone reads, only admins post.
    Announcement,
}

text_enum!(ChannelKind { Group => "group", Announcement => "announcement" });

// -- Quests --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Cancelled,
}

text_enum!(QuestStatus {
    Draft => "draft",
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl QuestStatus {
    pub fn can_transition_to(self, next: QuestStatus) -> bool {
        use QuestStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Draft, Cancelled) | (Active, Completed) | (Active, Cancelled)
        )
    }
}

// -- Points --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
}

text_enum!(ConversionStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Completed => "completed",
});

impl ConversionStatus {
    pub fn can_transition_to(self, next: ConversionStatus) -> bool {
        use ConversionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Completed)
        )
    }

    pub fn all() -> &'static [ConversionStatus] {
        &[
            ConversionStatus::Pending,
            ConversionStatus::Approved,
            ConversionStatus::Rejected,
            ConversionStatus::Completed,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_settles_once() {
        assert!(SwapStatus::Pending.can_transition_to(SwapStatus::Completed));
        assert!(SwapStatus::Pending.can_transition_to(SwapStatus::Failed));
        assert!(!SwapStatus::Completed.can_transition_to(SwapStatus::Failed));
        assert!(!SwapStatus::Failed.can_transition_to(SwapStatus::Completed));
        assert!(!SwapStatus::Pending.can_transition_to(SwapStatus::Pending));
    }

    #[test]
    fn test_quest_lifecycle() {
        use QuestStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Draft.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Cancelled));
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Draft));
    }

    #[test]
    fn test_conversion_workflow() {
        use ConversionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Rejected));
    }

    #[test]
    fn test_text_roundtrip_and_unknown() {
        assert_eq!("announcement".parse::<ChannelKind>(), Ok(ChannelKind::Announcement));
        assert_eq!(ChartInterval::FourHours.as_str(), "4h");
        assert_eq!("15m".parse::<ChartInterval>(), Ok(ChartInterval::FifteenMinutes));
        let err = "2h".parse::<ChartInterval>().unwrap_err();
        assert_eq!(err, UnknownVariant("2h".into()));
        assert_eq!(err.to_string(), "unknown variant '2h'");
        assert_eq!(ChartInterval::OneDay.as_millis(), 86_400_000);
    }

    #[test]
    fn test_serde_names_match_storage_names() {
        let json = serde_json::to_string(&ChartInterval::FiveMinutes).unwrap();
        assert_eq!(json, "\"5m\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }
}
