//! Ledger event types
//!
//! Events are buffered inside an invocation and published only after its
//! write set commits, so observers (such as the Relay) never see an event
//! for a change that was rolled back.

use crate::types::{Address, Amount};

use serde::{Deserialize, Serialize};

/// Events emitted by a channel's contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelEvent {
    /// Tokens issued to an address
    #[serde(rename_all = "camelCase")]
    Emitted { address: Address, amount: Amount },

    /// Source side of a transfer opened and escrowed
    #[serde(rename_all = "camelCase")]
    TransferInitiated {
        id: String,
        to_channel: String,
        token: String,
        owner: Address,
        amount: Amount,
    },

    /// Destination side of a transfer credited
    #[serde(rename_all = "camelCase")]
    TransferToCreated {
        id: String,
        from_channel: String,
        owner: Address,
        amount: Amount,
    },

    /// Source side finalized
    TransferCommitted { id: String },

    /// Source side aborted and refunded
    TransferCancelled { id: String },

    /// Source record garbage-collected
    TransferFromDeleted { id: String },

    /// Destination record garbage-collected
    TransferToDeleted { id: String },
}

impl ChannelEvent {
    /// Get event name for metrics and logs
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Emitted { .. } => "emitted",
            ChannelEvent::TransferInitiated { .. } => "transfer_initiated",
            ChannelEvent::TransferToCreated { .. } => "transfer_to_created",
            ChannelEvent::TransferCommitted { .. } => "transfer_committed",
            ChannelEvent::TransferCancelled { .. } => "transfer_cancelled",
            ChannelEvent::TransferFromDeleted { .. } => "transfer_from_deleted",
            ChannelEvent::TransferToDeleted { .. } => "transfer_to_deleted",
        }
    }

    /// Transfer id the event refers to, if any
    pub fn transfer_id(&self) -> Option<&str> {
        match self {
            ChannelEvent::Emitted { .. } => None,
            ChannelEvent::TransferInitiated { id, .. }
            | ChannelEvent::TransferToCreated { id, .. }
            | ChannelEvent::TransferCommitted { id }
            | ChannelEvent::TransferCancelled { id }
            | ChannelEvent::TransferFromDeleted { id }
            | ChannelEvent::TransferToDeleted { id } => Some(id),
        }
    }
}

/// Event as published on a channel's broadcast stream
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEvent {
    pub channel: String,
    pub tx_id: String,
    #[serde(flatten)]
    pub event: ChannelEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ChannelEvent::TransferCommitted { id: "t1".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transferCommitted");
        assert_eq!(json["id"], "t1");
        assert_eq!(event.name(), "transfer_committed");
        assert_eq!(event.transfer_id(), Some("t1"));
    }
}
