//! Token and allowed balances held on a channel
//!
//! A channel's own token lives in the token balance; assets native to other
//! channels that were moved here live in the allowed balance, per asset.

use crate::error::{ChannelError, ChannelResult};
use crate::state::composite_key;
use crate::tx::TxContext;
use crate::types::{Address, Amount};

use tracing::debug;

const BALANCE_KEY_TYPE: &str = "balance";

/// Which balance a movement applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceKind {
    /// The channel's own token
    Token,
    /// A foreign asset held on this channel
    Allowed { asset: String },
}

impl BalanceKind {
    /// Balance kind for `asset` on a channel whose own token is `own_token`
    pub fn for_asset(own_token: Option<&str>, asset: &str) -> Self {
        match own_token {
            Some(token) if token == asset => BalanceKind::Token,
            _ => BalanceKind::Allowed {
                asset: asset.to_string(),
            },
        }
    }

    fn key(&self, address: &Address) -> ChannelResult<String> {
        match self {
            BalanceKind::Token => composite_key(BALANCE_KEY_TYPE, &["token", address.as_str()]),
            BalanceKind::Allowed { asset } => {
                composite_key(BALANCE_KEY_TYPE, &["allowed", address.as_str(), asset])
            }
        }
    }
}

/// Balance reads and movements against a transaction context
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceBook;

impl BalanceBook {
    pub fn get(&self, tx: &TxContext<'_>, address: &Address, kind: &BalanceKind) -> ChannelResult<Amount> {
        let key = kind.key(address)?;
        match tx.get_state(&key)? {
            Some(bytes) => {
                let s = String::from_utf8(bytes)
                    .map_err(|e| ChannelError::Storage(format!("balance encoding: {}", e)))?;
                s.parse()
            }
            None => Ok(Amount::zero()),
        }
    }

    pub fn add(
        &self,
        tx: &mut TxContext<'_>,
        address: &Address,
        kind: &BalanceKind,
        amount: &Amount,
    ) -> ChannelResult<Amount> {
        let current = self.get(tx, address, kind)?;
        let next = &current + amount;
        self.put(tx, address, kind, &next)?;
        debug!("Credited {} to {} ({:?}), now {}", amount, address, kind, next);
        Ok(next)
    }

    pub fn sub(
        &self,
        tx: &mut TxContext<'_>,
        address: &Address,
        kind: &BalanceKind,
        amount: &Amount,
    ) -> ChannelResult<Amount> {
        let current = self.get(tx, address, kind)?;
        let next = current
            .checked_sub(amount)
            .ok_or_else(|| ChannelError::InsufficientBalance {
                address: address.to_string(),
                have: current.to_string(),
                need: amount.to_string(),
            })?;
        self.put(tx, address, kind, &next)?;
        debug!("Debited {} from {} ({:?}), now {}", amount, address, kind, next);
        Ok(next)
    }

    fn put(
        &self,
        tx: &mut TxContext<'_>,
        address: &Address,
        kind: &BalanceKind,
        value: &Amount,
    ) -> ChannelResult<()> {
        let key = kind.key(address)?;
        if value.is_zero() {
            tx.del_state(key);
        } else {
            tx.put_state(key, value.to_string().into_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryLedger;

    #[test]
    fn test_kind_for_asset() {
        assert_eq!(BalanceKind::for_asset(Some("FIAT"), "FIAT"), BalanceKind::Token);
        assert_eq!(
            BalanceKind::for_asset(None, "FIAT"),
            BalanceKind::Allowed {
                asset: "FIAT".into()
            }
        );
    }

    #[test]
    fn test_add_sub_and_insufficient() {
        let ledger = MemoryLedger::new();
        let mut tx = TxContext::new(&ledger);
        let book = BalanceBook;
        let alice = Address::parse("alice").unwrap();
        let kind = BalanceKind::Token;

        book.add(&mut tx, &alice, &kind, &Amount::from(1000)).unwrap();
        assert_eq!(book.sub(&mut tx, &alice, &kind, &Amount::from(450)).unwrap(), Amount::from(550));

        let err = book.sub(&mut tx, &alice, &kind, &Amount::from(551)).unwrap_err();
        assert!(matches!(err, ChannelError::InsufficientBalance { .. }));
        assert_eq!(book.get(&tx, &alice, &kind).unwrap(), Amount::from(550));

        let allowed = BalanceKind::Allowed { asset: "FIAT".into() };
        assert_eq!(book.get(&tx, &alice, &allowed).unwrap(), Amount::zero());
    }
}
