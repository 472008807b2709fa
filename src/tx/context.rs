//! Per-invocation transaction context

use crate::error::ChannelResult;
use crate::events::ChannelEvent;
use crate::state::{Ledger, Page, WriteSet};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Read-your-writes view of the ledger for a single invocation
///
/// Nothing reaches the ledger until [`TxContext::commit`]; dropping the
/// context discards every pending write and event.
pub struct TxContext<'a> {
    ledger: &'a dyn Ledger,
    tx_id: String,
    timestamp: DateTime<Utc>,
    writes: WriteSet,
    events: Vec<ChannelEvent>,
}

impl<'a> TxContext<'a> {
    /// Open a context with a fresh transaction id
    pub fn new(ledger: &'a dyn Ledger) -> Self {
        Self::with_id(ledger, uuid::Uuid::new_v4().to_string(), Utc::now())
    }

    pub fn with_id(ledger: &'a dyn Ledger, tx_id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            ledger,
            tx_id,
            timestamp,
            writes: WriteSet::new(),
            events: Vec::new(),
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn get_state(&self, key: &str) -> ChannelResult<Option<Vec<u8>>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        self.ledger.get_state(key)
    }

    pub fn put_state(&mut self, key: String, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    pub fn del_state(&mut self, key: String) {
        self.writes.insert(key, None);
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> ChannelResult<Option<T>> {
        match self.get_state(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&mut self, key: String, value: &T) -> ChannelResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put_state(key, bytes);
        Ok(())
    }

    /// Range scan over committed state (pending writes are not visible)
    pub fn range_page(
        &self,
        start: &str,
        end: &str,
        page_size: usize,
        bookmark: &str,
    ) -> ChannelResult<Page> {
        self.ledger.range_page(start, end, page_size, bookmark)
    }

    pub fn set_event(&mut self, event: ChannelEvent) {
        self.events.push(event);
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Apply the write set atomically and hand back the buffered events
    pub fn commit(self) -> ChannelResult<Vec<ChannelEvent>> {
        let count = self.writes.len();
        if count > 0 {
            self.ledger.apply(self.writes)?;
        }
        debug!("Committed tx {} with {} writes", self.tx_id, count);
        Ok(self.events)
    }
}
