//! Transaction lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The stages a transaction moves through on its way into a block.
///
/// The discriminants define the ordering used by the monotonic-update rule
/// and by "has the waiter's target been reached?" checks: a status update is
/// only accepted if the new ordinal is greater than or equal to the current
/// one. [`TransactionStatus::Rejected`] sits in the middle of the ordering
/// but is terminal; see `is_terminal`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TransactionStatus {
    #[default]
    Unknown = 0,
    Queued = 1,
    Received = 2,
    Stored = 3,
    AnnouncedToNetwork = 4,
    RequestedByNetwork = 5,
    SentToNetwork = 6,
    Rejected = 7,
    SeenInOrphanMempool = 8,
    AcceptedByNetwork = 9,
    SeenOnNetwork = 10,
    Mined = 11,
    Confirmed = 12,
}

impl TransactionStatus {
    /// The ordinal used for monotonicity comparisons.
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Terminal statuses evict the in-memory processor entry.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Mined | Self::Confirmed)
    }

    /// Whether `self` satisfies a waiter that asked for `target`.
    pub const fn reached(self, target: Self) -> bool {
        self.ordinal() >= target.ordinal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "UNKNOWN",
            Self::Queued => "QUEUED",
            Self::Received => "RECEIVED",
            Self::Stored => "STORED",
            Self::AnnouncedToNetwork => "ANNOUNCED_TO_NETWORK",
            Self::RequestedByNetwork => "REQUESTED_BY_NETWORK",
            Self::SentToNetwork => "SENT_TO_NETWORK",
            Self::Rejected => "REJECTED",
            Self::SeenInOrphanMempool => "SEEN_IN_ORPHAN_MEMPOOL",
            Self::AcceptedByNetwork => "ACCEPTED_BY_NETWORK",
            Self::SeenOnNetwork => "SEEN_ON_NETWORK",
            Self::Mined => "MINED",
            Self::Confirmed => "CONFIRMED",
        })
    }
}
