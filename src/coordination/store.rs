//! Keyed storage of transfer records
//!
//! Layout per side (`from` / `to`), all under the `cct` object type:
//! - `<side>/<sequence>`: the record, zero-padded so key order is creation order
//! - `<side>Id/<id>`: sequence of the live record with that id
//! - `<side>Done/<id>`: tombstone left by deletion
//! - `seq`: last sequence handed out on this channel

use super::record::{Side, TransferPage, TransferRecord};
use crate::error::{ChannelError, ChannelResult};
use crate::state::{composite_key, prefix_range};
use crate::tx::TxContext;

use tracing::debug;

const RECORD_KEY_TYPE: &str = "cct";

/// Transfer record storage over a transaction context
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferStore;

impl TransferStore {
    /// Live record with `id`, if any
    pub fn get(&self, tx: &TxContext<'_>, side: Side, id: &str) -> ChannelResult<Option<TransferRecord>> {
        let Some(sequence) = self.sequence_of(tx, side, id)? else {
            return Ok(None);
        };
        tx.get_json(&record_key(side, sequence)?)
    }

    /// Whether `id` was ever stored on this side, live or deleted
    pub fn is_used(&self, tx: &TxContext<'_>, side: Side, id: &str) -> ChannelResult<bool> {
        if self.sequence_of(tx, side, id)?.is_some() {
            return Ok(true);
        }
        Ok(tx.get_state(&tombstone_key(side, id)?)?.is_some())
    }

    /// Store a new record, assigning its creation sequence
    pub fn insert(
        &self,
        tx: &mut TxContext<'_>,
        side: Side,
        mut record: TransferRecord,
    ) -> ChannelResult<TransferRecord> {
        if self.is_used(tx, side, &record.id)? {
            return Err(ChannelError::DuplicateTransferId { id: record.id });
        }

        let sequence = self.next_sequence(tx)?;
        record.sequence = sequence;

        tx.put_json(record_key(side, sequence)?, &record)?;
        tx.put_state(index_key(side, &record.id)?, sequence.to_string().into_bytes());

        debug!(
            "Stored transfer {} ({}) at sequence {}",
            record.id,
            side.as_str(),
            sequence
        );
        Ok(record)
    }

    /// Overwrite an existing record in place
    pub fn update(&self, tx: &mut TxContext<'_>, side: Side, record: &TransferRecord) -> ChannelResult<()> {
        tx.put_json(record_key(side, record.sequence)?, record)
    }

    /// Delete a record and leave a tombstone for its id
    pub fn remove(&self, tx: &mut TxContext<'_>, side: Side, record: &TransferRecord) -> ChannelResult<()> {
        tx.del_state(record_key(side, record.sequence)?);
        tx.del_state(index_key(side, &record.id)?);
        tx.put_state(
            tombstone_key(side, &record.id)?,
            record.sequence.to_string().into_bytes(),
        );
        Ok(())
    }

    /// One page of records in creation order
    pub fn list(
        &self,
        tx: &TxContext<'_>,
        side: Side,
        page_size: usize,
        bookmark: &str,
    ) -> ChannelResult<TransferPage> {
        let (start, end) = prefix_range(RECORD_KEY_TYPE, &[side.as_str()])?;
        let page = tx.range_page(&start, &end, page_size, bookmark)?;

        let records = page
            .entries
            .iter()
            .map(|(_, bytes)| serde_json::from_slice(bytes))
            .collect::<Result<Vec<TransferRecord>, _>>()?;

        Ok(TransferPage {
            records,
            bookmark: page.bookmark,
        })
    }

    fn sequence_of(&self, tx: &TxContext<'_>, side: Side, id: &str) -> ChannelResult<Option<u64>> {
        match tx.get_state(&index_key(side, id)?)? {
            Some(bytes) => Ok(Some(parse_sequence(&bytes)?)),
            None => Ok(None),
        }
    }

    fn next_sequence(&self, tx: &mut TxContext<'_>) -> ChannelResult<u64> {
        let key = composite_key(RECORD_KEY_TYPE, &["seq"])?;
        let last = match tx.get_state(&key)? {
            Some(bytes) => parse_sequence(&bytes)?,
            None => 0,
        };
        let next = last + 1;
        tx.put_state(key, next.to_string().into_bytes());
        Ok(next)
    }
}

fn record_key(side: Side, sequence: u64) -> ChannelResult<String> {
    composite_key(RECORD_KEY_TYPE, &[side.as_str(), &format!("{:020}", sequence)])
}

fn index_key(side: Side, id: &str) -> ChannelResult<String> {
    composite_key(RECORD_KEY_TYPE, &[&format!("{}Id", side.as_str()), id])
}

fn tombstone_key(side: Side, id: &str) -> ChannelResult<String> {
    composite_key(RECORD_KEY_TYPE, &[&format!("{}Done", side.as_str()), id])
}

fn parse_sequence(bytes: &[u8]) -> ChannelResult<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ChannelError::Storage("corrupt sequence value".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::record::TransferStatus;
    use crate::state::MemoryLedger;
    use crate::types::{Address, Amount};
    use std::collections::HashSet;

    fn record(id: &str) -> TransferRecord {
        TransferRecord {
            id: id.to_string(),
            from: "FIAT".into(),
            to: "CC".into(),
            token: "FIAT".into(),
            owner: Address::parse("user1").unwrap(),
            amount: Amount::from(100),
            forward: true,
            status: TransferStatus::Created,
            sequence: 0,
            created_at: chrono::Utc::now(),
            tx_id: "tx".into(),
        }
    }

    fn seeded(ledger: &MemoryLedger, ids: &[&str]) {
        let store = TransferStore;
        let mut tx = TxContext::new(ledger);
        for id in ids {
            store.insert(&mut tx, Side::From, record(id)).unwrap();
        }
        tx.commit().unwrap();
    }

    #[test]
    fn test_insert_assigns_increasing_sequence() {
        let ledger = MemoryLedger::new();
        let store = TransferStore;
        let mut tx = TxContext::new(&ledger);

        let a = store.insert(&mut tx, Side::From, record("a")).unwrap();
        let b = store.insert(&mut tx, Side::From, record("b")).unwrap();
        assert!(b.sequence > a.sequence);
        assert_eq!(store.get(&tx, Side::From, "b").unwrap(), Some(b));
        assert_eq!(store.get(&tx, Side::To, "b").unwrap(), None);

        let err = store.insert(&mut tx, Side::From, record("a")).unwrap_err();
        assert_eq!(err, ChannelError::DuplicateTransferId { id: "a".into() });
    }

    #[test]
    fn test_remove_leaves_tombstone() {
        let ledger = MemoryLedger::new();
        seeded(&ledger, &["a"]);
        let store = TransferStore;

        let mut tx = TxContext::new(&ledger);
        let rec = store.get(&tx, Side::From, "a").unwrap().unwrap();
        store.remove(&mut tx, Side::From, &rec).unwrap();
        tx.commit().unwrap();

        let tx = TxContext::new(&ledger);
        assert_eq!(store.get(&tx, Side::From, "a").unwrap(), None);
        assert!(store.is_used(&tx, Side::From, "a").unwrap());
        assert!(!store.is_used(&tx, Side::To, "a").unwrap());
    }

    #[test]
    fn test_list_in_creation_order_with_bookmarks() {
        let ledger = MemoryLedger::new();
        // ids deliberately not in lexical order
        let ids = ["zeta", "alpha", "mid", "beta", "omega"];
        seeded(&ledger, &ids);

        let store = TransferStore;
        let tx = TxContext::new(&ledger);

        let all = store.list(&tx, Side::From, 1000, "").unwrap();
        assert!(all.bookmark.is_empty());
        let order: Vec<_> = all.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, ids);

        let mut seen = HashSet::new();
        let mut bookmark = String::new();
        let mut continued = 0;
        loop {
            let page = store.list(&tx, Side::From, 2, &bookmark).unwrap();
            assert!(page.records.len() <= 2);
            for r in page.records {
                assert!(seen.insert(r.id));
            }
            if page.bookmark.is_empty() {
                break;
            }
            continued += 1;
            bookmark = page.bookmark;
        }
        assert_eq!(seen.len(), ids.len());
        assert_eq!(continued, 2);
    }

    #[test]
    fn test_list_skips_destination_records() {
        let ledger = MemoryLedger::new();
        let store = TransferStore;
        let mut tx = TxContext::new(&ledger);
        store.insert(&mut tx, Side::To, record("incoming")).unwrap();
        store.insert(&mut tx, Side::From, record("outgoing")).unwrap();
        tx.commit().unwrap();

        let tx = TxContext::new(&ledger);
        let page = store.list(&tx, Side::From, 10, "").unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "outgoing");
    }
}
