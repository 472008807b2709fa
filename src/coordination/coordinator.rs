//! Cross-channel transfer saga, one channel's half
//!
//! The coordinator never touches another channel. Atomicity across channels
//! comes from the Relay's ordering (query destination before committing the
//! source, cancel only while the destination was never created); the job
//! here is to make every step idempotent and to make Commit and Cancel
//! mutually exclusive and irrevocable.

use super::record::{Side, TransferPage, TransferRecord, TransferStatus};
use super::store::TransferStore;
use crate::balance::{BalanceBook, BalanceKind};
use crate::error::{ChannelError, ChannelResult};
use crate::events::ChannelEvent;
use crate::tx::TxContext;
use crate::types::{is_valid_ident, Address, Amount, Caller, Role};

use tracing::{debug, info, warn};

/// Whose balance an outgoing transfer debits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// The signing caller pays and owns the transfer
    ByCustomer,
    /// An administrator moves `target`'s funds
    ByAdmin { target: Address },
}

/// Parameters of `InitiateTransfer`
#[derive(Debug, Clone)]
pub struct InitiateTransfer {
    pub id: String,
    pub to_channel: String,
    pub token: String,
    pub amount: Amount,
    pub mode: TransferMode,
}

/// Transfer state machine bound to one channel
#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    /// Channel this instance runs on
    channel: String,
    /// The channel's own token, if it issues one
    token: Option<String>,
    store: TransferStore,
    balances: BalanceBook,
}

impl TransferCoordinator {
    pub fn new(channel: impl Into<String>, token: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            token,
            store: TransferStore,
            balances: BalanceBook,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Open the source side: escrow the payer's funds and record `Created`
    pub fn initiate(
        &self,
        tx: &mut TxContext<'_>,
        caller: &Caller,
        req: InitiateTransfer,
    ) -> ChannelResult<TransferRecord> {
        validate_id(&req.id)?;
        if req.amount.is_zero() {
            return Err(ChannelError::InvalidAmount);
        }

        let owner = match req.mode {
            TransferMode::ByCustomer => caller.address.clone(),
            TransferMode::ByAdmin { target } => {
                if caller.role != Role::Admin {
                    return Err(ChannelError::Unauthorized(format!(
                        "{} is not an administrator",
                        caller.address
                    )));
                }
                target
            }
        };

        if !is_valid_ident(&req.to_channel) {
            return Err(ChannelError::InvalidAsset {
                asset: req.token,
                from: self.channel.clone(),
                to: req.to_channel,
            });
        }
        if req.to_channel == self.channel {
            return Err(ChannelError::SameChannel(req.to_channel));
        }

        // Own token leaves forward; a foreign asset may only go back home
        let forward = self.token.as_deref() == Some(req.token.as_str());
        if !forward && req.token != req.to_channel {
            return Err(ChannelError::InvalidAsset {
                asset: req.token,
                from: self.channel.clone(),
                to: req.to_channel,
            });
        }

        if self.store.is_used(tx, Side::From, &req.id)? {
            return Err(ChannelError::DuplicateTransferId { id: req.id });
        }

        let kind = self.balance_kind(&req.token);
        self.balances.sub(tx, &owner, &kind, &req.amount)?;

        let record = TransferRecord {
            id: req.id,
            from: self.channel.clone(),
            to: req.to_channel,
            token: req.token,
            owner,
            amount: req.amount,
            forward,
            status: TransferStatus::Created,
            sequence: 0,
            created_at: tx.timestamp(),
            tx_id: tx.tx_id().to_string(),
        };
        let record = self.store.insert(tx, Side::From, record)?;

        tx.set_event(ChannelEvent::TransferInitiated {
            id: record.id.clone(),
            to_channel: record.to.clone(),
            token: record.token.clone(),
            owner: record.owner.clone(),
            amount: record.amount.clone(),
        });

        info!(
            "Transfer {} initiated on {}: {} {} of {} -> {}",
            record.id, self.channel, record.amount, record.token, record.owner, record.to
        );
        Ok(record)
    }

    /// Snapshot of the source-side record
    pub fn transfer_from(&self, tx: &TxContext<'_>, id: &str) -> ChannelResult<Option<TransferRecord>> {
        self.store.get(tx, Side::From, id)
    }

    /// Snapshot of the destination-side record
    pub fn transfer_to(&self, tx: &TxContext<'_>, id: &str) -> ChannelResult<Option<TransferRecord>> {
        self.store.get(tx, Side::To, id)
    }

    /// Replay a source snapshot on the destination channel and credit the owner
    pub fn create_transfer_to(&self, tx: &mut TxContext<'_>, snapshot: &str) -> ChannelResult<TransferRecord> {
        let source: TransferRecord = serde_json::from_str(snapshot)
            .map_err(|e| ChannelError::MalformedSnapshot(e.to_string()))?;

        validate_id(&source.id)?;
        if source.to != self.channel {
            return Err(ChannelError::MalformedSnapshot(format!(
                "transfer {} targets {}, not {}",
                source.id, source.to, self.channel
            )));
        }
        if source.from == self.channel {
            return Err(ChannelError::SameChannel(source.from));
        }

        // A redelivery is reported as already applied whatever the source status is now
        if self.store.is_used(tx, Side::To, &source.id)? {
            debug!("Transfer {} already created on {}", source.id, self.channel);
            return Err(ChannelError::DuplicateTransferId { id: source.id });
        }

        if source.status != TransferStatus::Created {
            return Err(ChannelError::MalformedSnapshot(format!(
                "transfer {} is {} on the source channel",
                source.id, source.status
            )));
        }
        if source.amount.is_zero() {
            return Err(ChannelError::InvalidAmount);
        }

        // Coming home as our own token, or arriving as a foreign asset from its origin
        let own = self.token.as_deref() == Some(source.token.as_str());
        if !own && source.token != source.from {
            return Err(ChannelError::InvalidAsset {
                asset: source.token,
                from: source.from,
                to: source.to,
            });
        }

        let kind = self.balance_kind(&source.token);
        self.balances.add(tx, &source.owner, &kind, &source.amount)?;

        let record = TransferRecord {
            status: TransferStatus::Created,
            sequence: 0,
            created_at: tx.timestamp(),
            tx_id: tx.tx_id().to_string(),
            ..source
        };
        let record = self.store.insert(tx, Side::To, record)?;

        tx.set_event(ChannelEvent::TransferToCreated {
            id: record.id.clone(),
            from_channel: record.from.clone(),
            owner: record.owner.clone(),
            amount: record.amount.clone(),
        });

        info!(
            "Transfer {} credited on {}: {} {} to {}",
            record.id, self.channel, record.amount, record.token, record.owner
        );
        Ok(record)
    }

    /// Finalize the source debit; a repeated commit is a no-op
    pub fn commit_transfer_from(&self, tx: &mut TxContext<'_>, id: &str) -> ChannelResult<TransferRecord> {
        let mut record = self.require_from(tx, id)?;

        match record.status {
            TransferStatus::Committed => {
                debug!("Transfer {} already committed", id);
                Ok(record)
            }
            TransferStatus::Cancelled => {
                warn!("Refusing to commit cancelled transfer {}", id);
                Err(invalid_transition(id, record.status, TransferStatus::Committed))
            }
            TransferStatus::Created => {
                record.status = TransferStatus::Committed;
                self.store.update(tx, Side::From, &record)?;
                tx.set_event(ChannelEvent::TransferCommitted { id: id.to_string() });
                info!("Transfer {} committed on {}", id, self.channel);
                Ok(record)
            }
        }
    }

    /// Abort the source side and refund the payer; a repeated cancel is a no-op
    pub fn cancel_transfer_from(&self, tx: &mut TxContext<'_>, id: &str) -> ChannelResult<TransferRecord> {
        let mut record = self.require_from(tx, id)?;

        match record.status {
            TransferStatus::Cancelled => {
                debug!("Transfer {} already cancelled", id);
                Ok(record)
            }
            TransferStatus::Committed => {
                warn!("Refusing to cancel committed transfer {}", id);
                Err(invalid_transition(id, record.status, TransferStatus::Cancelled))
            }
            TransferStatus::Created => {
                let kind = self.balance_kind(&record.token);
                self.balances.add(tx, &record.owner, &kind, &record.amount)?;

                record.status = TransferStatus::Cancelled;
                self.store.update(tx, Side::From, &record)?;
                tx.set_event(ChannelEvent::TransferCancelled { id: id.to_string() });
                info!(
                    "Transfer {} cancelled on {}, refunded {} to {}",
                    id, self.channel, record.amount, record.owner
                );
                Ok(record)
            }
        }
    }

    /// Garbage-collect a finalized source record; absent ids are a no-op
    pub fn delete_transfer_from(&self, tx: &mut TxContext<'_>, id: &str) -> ChannelResult<bool> {
        let Some(record) = self.store.get(tx, Side::From, id)? else {
            debug!("Transfer {} already gone from {}", id, self.channel);
            return Ok(false);
        };

        if !record.status.is_final() {
            return Err(ChannelError::NotFinalized {
                id: id.to_string(),
                status: record.status.to_string(),
            });
        }

        self.store.remove(tx, Side::From, &record)?;
        tx.set_event(ChannelEvent::TransferFromDeleted { id: id.to_string() });
        Ok(true)
    }

    /// Garbage-collect a destination record; absent ids are a no-op
    pub fn delete_transfer_to(&self, tx: &mut TxContext<'_>, id: &str) -> ChannelResult<bool> {
        let Some(record) = self.store.get(tx, Side::To, id)? else {
            debug!("Transfer {} already gone from {}", id, self.channel);
            return Ok(false);
        };

        // The destination side has no abort path; Created is its final state
        if record.status != TransferStatus::Created {
            return Err(ChannelError::NotFinalized {
                id: id.to_string(),
                status: record.status.to_string(),
            });
        }

        self.store.remove(tx, Side::To, &record)?;
        tx.set_event(ChannelEvent::TransferToDeleted { id: id.to_string() });
        Ok(true)
    }

    /// Page through source records in creation order
    pub fn transfers_from(
        &self,
        tx: &TxContext<'_>,
        page_size: usize,
        bookmark: &str,
    ) -> ChannelResult<TransferPage> {
        if page_size == 0 {
            return Err(ChannelError::InvalidPageSize);
        }
        self.store.list(tx, Side::From, page_size, bookmark)
    }

    fn require_from(&self, tx: &TxContext<'_>, id: &str) -> ChannelResult<TransferRecord> {
        self.store
            .get(tx, Side::From, id)?
            .ok_or_else(|| ChannelError::TransferNotFound { id: id.to_string() })
    }

    fn balance_kind(&self, asset: &str) -> BalanceKind {
        BalanceKind::for_asset(self.token.as_deref(), asset)
    }
}

fn validate_id(id: &str) -> ChannelResult<()> {
    if !is_valid_ident(id) {
        return Err(ChannelError::InvalidTransferId(id.to_string()));
    }
    Ok(())
}

fn invalid_transition(id: &str, from: TransferStatus, to: TransferStatus) -> ChannelError {
    ChannelError::InvalidTransition {
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}
