mod channels;
mod conversations;
mod nft;
mod points;
mod quests;
mod swaps;

pub use conversations::{DeleteOutcome, LeaveOutcome};
pub use points::{AdjustOutcome, ConversionOutcome, RequestOutcome, Review};
pub use quests::{JoinOutcome, QuestChanges, QuestEditOutcome, TaskOutcome, TransitionOutcome};
pub use swaps::{NewSwap, RecordOutcome, SwapUpdateOutcome};

use anyhow::Result;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// `?1, ?2, ... ?n` starting at `start`.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
