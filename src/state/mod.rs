//! Ledger state access
//!
//! Handles:
//! - The `Ledger` trait every channel's storage is injected through
//! - Composite key construction for range-scannable prefixes
//! - An in-process ordered implementation (`MemoryLedger`)

mod memory;

pub use memory::MemoryLedger;

use crate::error::{ChannelError, ChannelResult};

use std::collections::BTreeMap;

/// Separator between composite key parts
const KEY_SEPARATOR: char = '\u{0}';
/// Upper bound appended to a prefix to form an exclusive range end
const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

/// Pending writes of one invocation: `None` deletes the key
pub type WriteSet = BTreeMap<String, Option<Vec<u8>>>;

/// One page of a range scan
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<(String, Vec<u8>)>,
    /// Opaque continuation, empty when the range is exhausted
    pub bookmark: String,
}

/// Per-channel key-value ledger
///
/// Implementations must apply a write set atomically: either every write
/// becomes visible or none does.
pub trait Ledger: Send + Sync {
    /// Point read of committed state
    fn get_state(&self, key: &str) -> ChannelResult<Option<Vec<u8>>>;

    /// Scan `[start, end)` in key order, resuming at `bookmark` when non-empty
    fn range_page(
        &self,
        start: &str,
        end: &str,
        page_size: usize,
        bookmark: &str,
    ) -> ChannelResult<Page>;

    /// Atomically apply a write set
    fn apply(&self, writes: WriteSet) -> ChannelResult<()>;
}

/// Build a composite key `\0type\0part1\0part2\0`
pub fn composite_key(object_type: &str, parts: &[&str]) -> ChannelResult<String> {
    let mut key = String::with_capacity(
        2 + object_type.len() + parts.iter().map(|p| p.len() + 1).sum::<usize>(),
    );
    key.push(KEY_SEPARATOR);
    push_part(&mut key, object_type)?;
    for part in parts {
        push_part(&mut key, part)?;
    }
    Ok(key)
}

/// Start and exclusive end of every key under `object_type` + `parts`
pub fn prefix_range(object_type: &str, parts: &[&str]) -> ChannelResult<(String, String)> {
    let start = composite_key(object_type, parts)?;
    let mut end = start.clone();
    end.push(MAX_UNICODE_RUNE);
    Ok((start, end))
}

fn push_part(key: &mut String, part: &str) -> ChannelResult<()> {
    if part.contains(KEY_SEPARATOR) {
        return Err(ChannelError::Storage(format!(
            "key part {:?} contains a separator",
            part
        )));
    }
    key.push_str(part);
    key.push(KEY_SEPARATOR);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_layout() {
        let key = composite_key("balance", &["token", "alice"]).unwrap();
        assert_eq!(key, "\u{0}balance\u{0}token\u{0}alice\u{0}");
    }

    #[test]
    fn test_prefix_range_contains_children_only() {
        let (start, end) = prefix_range("cct", &["from"]).unwrap();
        let child = composite_key("cct", &["from", "00000000000000000001"]).unwrap();
        let sibling = composite_key("cct", &["fromId", "x"]).unwrap();
        assert!(child >= start && child < end);
        assert!(!(sibling >= start && sibling < end));
    }

    #[test]
    fn test_separator_rejected() {
        assert!(composite_key("cct", &["a\u{0}b"]).is_err());
    }
}
