//! In-process ordered ledger

use super::{Ledger, Page, WriteSet};
use crate::error::{ChannelError, ChannelResult};

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use tracing::debug;

/// Ledger backed by an ordered map; bookmarks are hex-encoded resume keys
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for MemoryLedger {
    fn get_state(&self, key: &str) -> ChannelResult<Option<Vec<u8>>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.get(key).cloned())
    }

    fn range_page(
        &self,
        start: &str,
        end: &str,
        page_size: usize,
        bookmark: &str,
    ) -> ChannelResult<Page> {
        if page_size == 0 {
            return Err(ChannelError::InvalidPageSize);
        }

        let from = if bookmark.is_empty() {
            start.to_string()
        } else {
            let raw = hex::decode(bookmark)
                .map_err(|e| ChannelError::InvalidBookmark(e.to_string()))?;
            let resume = String::from_utf8(raw)
                .map_err(|e| ChannelError::InvalidBookmark(e.to_string()))?;
            if resume.as_str() < start {
                start.to_string()
            } else {
                resume
            }
        };

        if from.as_str() >= end {
            return Ok(Page::default());
        }

        let state = self.state.read().map_err(poisoned)?;
        let mut iter = state.range::<str, _>((Bound::Included(from.as_str()), Bound::Excluded(end)));

        let entries: Vec<(String, Vec<u8>)> = iter
            .by_ref()
            .take(page_size)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // The first key past the page is where the next call resumes
        let bookmark = iter
            .next()
            .map(|(k, _)| hex::encode(k.as_bytes()))
            .unwrap_or_default();

        debug!(
            "Range scan returned {} entries (more: {})",
            entries.len(),
            !bookmark.is_empty()
        );

        Ok(Page { entries, bookmark })
    }

    fn apply(&self, writes: WriteSet) -> ChannelResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        for (key, value) in writes {
            match value {
                Some(v) => {
                    state.insert(key, v);
                }
                None => {
                    state.remove(&key);
                }
            }
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> ChannelError {
    ChannelError::Storage("ledger lock poisoned".to_string())
}
