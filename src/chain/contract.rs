//! Contract methods of a channel
//!
//! Each method is a plain function over the contract and an invocation's
//! transaction context. Arguments arrive as strings in the order listed in
//! the method table; payloads are returned as JSON text.

use crate::balance::{BalanceBook, BalanceKind};
use crate::coordination::{InitiateTransfer, TransferCoordinator, TransferMode};
use crate::error::{ChannelError, ChannelResult};
use crate::events::ChannelEvent;
use crate::tx::{NonceGuard, NoncePolicy, TxContext};
use crate::types::{is_valid_ident, Address, Amount, Caller, Role};

use tracing::info;

/// State-free contract bound to one channel
#[derive(Debug, Clone)]
pub struct Contract {
    name: String,
    token: Option<String>,
    nonces: NonceGuard,
    coordinator: TransferCoordinator,
    balances: BalanceBook,
}

impl Contract {
    pub fn new(name: impl Into<String>, token: Option<String>, policy: NoncePolicy) -> Self {
        let name = name.into();
        Self {
            coordinator: TransferCoordinator::new(name.clone(), token.clone()),
            name,
            token,
            nonces: NonceGuard::new(policy),
            balances: BalanceBook,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn nonces(&self) -> &NonceGuard {
        &self.nonces
    }

    pub fn coordinator(&self) -> &TransferCoordinator {
        &self.coordinator
    }
}

// Signed methods

pub(super) fn emit(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    if caller.role != Role::Admin {
        return Err(ChannelError::Unauthorized(format!(
            "{} may not emit {}",
            caller.address,
            contract.token().unwrap_or_default()
        )));
    }
    let address = Address::parse(&args[0])?;
    let amount = positive_amount(&args[1])?;

    let balance = contract
        .balances
        .add(tx, &address, &BalanceKind::Token, &amount)?;
    tx.set_event(ChannelEvent::Emitted {
        address: address.clone(),
        amount: amount.clone(),
    });

    info!("Emitted {} on {} to {}", amount, contract.name, address);
    Ok(serde_json::to_string(&balance)?)
}

pub(super) fn transfer_by_customer(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    let req = InitiateTransfer {
        id: args[0].clone(),
        to_channel: args[1].clone(),
        token: args[2].clone(),
        amount: args[3].parse()?,
        mode: TransferMode::ByCustomer,
    };
    let record = contract.coordinator.initiate(tx, caller, req)?;
    Ok(serde_json::to_string(&record)?)
}

pub(super) fn transfer_by_admin(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    let req = InitiateTransfer {
        id: args[0].clone(),
        to_channel: args[1].clone(),
        token: args[3].clone(),
        amount: args[4].parse()?,
        mode: TransferMode::ByAdmin {
            target: Address::parse(&args[2])?,
        },
    };
    let record = contract.coordinator.initiate(tx, caller, req)?;
    Ok(serde_json::to_string(&record)?)
}

// Relay methods

pub(super) fn create_transfer_to(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    _caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    let record = contract.coordinator.create_transfer_to(tx, &args[0])?;
    Ok(serde_json::to_string(&record)?)
}

pub(super) fn commit_transfer_from(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    _caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    let record = contract.coordinator.commit_transfer_from(tx, &args[0])?;
    Ok(serde_json::to_string(&record)?)
}

pub(super) fn cancel_transfer_from(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    _caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    let record = contract.coordinator.cancel_transfer_from(tx, &args[0])?;
    Ok(serde_json::to_string(&record)?)
}

pub(super) fn delete_transfer_from(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    _caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    let deleted = contract.coordinator.delete_transfer_from(tx, &args[0])?;
    Ok(serde_json::to_string(&deleted)?)
}

pub(super) fn delete_transfer_to(
    contract: &Contract,
    tx: &mut TxContext<'_>,
    _caller: &Caller,
    args: &[String],
) -> ChannelResult<String> {
    let deleted = contract.coordinator.delete_transfer_to(tx, &args[0])?;
    Ok(serde_json::to_string(&deleted)?)
}

// Queries

pub(super) fn transfer_from(contract: &Contract, tx: &TxContext<'_>, args: &[String]) -> ChannelResult<String> {
    match contract.coordinator.transfer_from(tx, &args[0])? {
        Some(record) => Ok(serde_json::to_string(&record)?),
        None => Ok(String::new()),
    }
}

pub(super) fn transfer_to(contract: &Contract, tx: &TxContext<'_>, args: &[String]) -> ChannelResult<String> {
    match contract.coordinator.transfer_to(tx, &args[0])? {
        Some(record) => Ok(serde_json::to_string(&record)?),
        None => Ok(String::new()),
    }
}

pub(super) fn transfers_from(contract: &Contract, tx: &TxContext<'_>, args: &[String]) -> ChannelResult<String> {
    let page_size: usize = args[0].parse().map_err(|_| ChannelError::InvalidPageSize)?;
    let page = contract.coordinator.transfers_from(tx, page_size, &args[1])?;
    Ok(serde_json::to_string(&page)?)
}

pub(super) fn get_nonce(contract: &Contract, tx: &TxContext<'_>, args: &[String]) -> ChannelResult<String> {
    let address = Address::parse(&args[0])?;
    contract.nonces.window(tx, &address)?.to_json()
}

pub(super) fn balance_of(contract: &Contract, tx: &TxContext<'_>, args: &[String]) -> ChannelResult<String> {
    let address = Address::parse(&args[0])?;
    let balance = contract.balances.get(tx, &address, &BalanceKind::Token)?;
    Ok(serde_json::to_string(&balance)?)
}

pub(super) fn allowed_balance_of(contract: &Contract, tx: &TxContext<'_>, args: &[String]) -> ChannelResult<String> {
    let address = Address::parse(&args[0])?;
    let asset = &args[1];
    if !is_valid_ident(asset) {
        return Err(ChannelError::InvalidAsset {
            asset: asset.clone(),
            from: contract.name.clone(),
            to: contract.name.clone(),
        });
    }
    let kind = BalanceKind::Allowed { asset: asset.clone() };
    let balance = contract.balances.get(tx, &address, &kind)?;
    Ok(serde_json::to_string(&balance)?)
}

fn positive_amount(raw: &str) -> ChannelResult<Amount> {
    let amount: Amount = raw.parse()?;
    if amount.is_zero() {
        return Err(ChannelError::InvalidAmount);
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryLedger;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn admin() -> Caller {
        Caller::new(Address::parse("admin").unwrap(), Role::Admin)
    }

    #[test]
    fn test_emit_requires_admin_and_positive_amount() {
        let contract = Contract::new("FIAT", Some("FIAT".into()), NoncePolicy::default());
        let ledger = MemoryLedger::new();
        let mut tx = TxContext::new(&ledger);

        let customer = Caller::new(Address::parse("user1").unwrap(), Role::Customer);
        let err = emit(&contract, &mut tx, &customer, &args(&["user1", "10"])).unwrap_err();
        assert!(matches!(err, ChannelError::Unauthorized(_)));

        let err = emit(&contract, &mut tx, &admin(), &args(&["user1", "0"])).unwrap_err();
        assert_eq!(err, ChannelError::InvalidAmount);

        let payload = emit(&contract, &mut tx, &admin(), &args(&["user1", "1000"])).unwrap();
        assert_eq!(payload, "\"1000\"");
        assert_eq!(balance_of(&contract, &tx, &args(&["user1"])).unwrap(), "\"1000\"");
    }

    #[test]
    fn test_queries_on_empty_ledger() {
        let contract = Contract::new("CC", None, NoncePolicy::default());
        let ledger = MemoryLedger::new();
        let tx = TxContext::new(&ledger);

        assert_eq!(get_nonce(&contract, &tx, &args(&["user1"])).unwrap(), "\"0\"");
        assert_eq!(transfer_from(&contract, &tx, &args(&["t1"])).unwrap(), "");
        assert_eq!(transfer_to(&contract, &tx, &args(&["t1"])).unwrap(), "");
        assert_eq!(
            allowed_balance_of(&contract, &tx, &args(&["user1", "FIAT"])).unwrap(),
            "\"0\""
        );
        assert_eq!(
            transfers_from(&contract, &tx, &args(&["x", ""])).unwrap_err(),
            ChannelError::InvalidPageSize
        );
        assert_eq!(
            transfers_from(&contract, &tx, &args(&["10", ""])).unwrap(),
            r#"{"records":[],"bookmark":""}"#
        );
    }
}
