//! Transfer records shared by the source and destination sides

use crate::types::{Address, Amount};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a stored transfer record
///
/// The destination side only ever holds `Created`; deletion removes the
/// record instead of being a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Created,
    Committed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Created => "created",
            TransferStatus::Committed => "committed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal for the source side: safe to garbage-collect
    pub fn is_final(&self) -> bool {
        matches!(self, TransferStatus::Committed | TransferStatus::Cancelled)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a transfer a record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Stored on the source channel
    From,
    /// Stored on the destination channel
    To,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::From => "from",
            Side::To => "to",
        }
    }
}

/// One side of a cross-channel transfer
///
/// The two sides are linked only by `id`; neither holds a reference to the
/// other channel's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    /// Source channel
    pub from: String,
    /// Destination channel
    pub to: String,
    /// Asset moved; identical on both sides
    pub token: String,
    pub owner: Address,
    pub amount: Amount,
    /// Asset is native to the source channel
    pub forward: bool,
    pub status: TransferStatus,
    /// Creation order on the channel holding this record
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub tx_id: String,
}

/// Result page of `channelTransfersFrom`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPage {
    pub records: Vec<TransferRecord>,
    /// Empty when there is nothing left to read
    pub bookmark: String,
}
