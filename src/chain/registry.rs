//! Method registry built from a channel's capabilities
//!
//! Capabilities are resolved once, when the channel is constructed. An
//! invocation either finds a typed handler with a known arity or fails with
//! `UnknownMethod`; nothing is checked again at call time.

use super::contract::{self, Contract};
use crate::config::Capabilities;
use crate::error::{ChannelError, ChannelResult};
use crate::tx::TxContext;
use crate::types::Caller;

use std::collections::HashMap;

/// State-mutating method, signed by a customer/admin or issued by the Relay
pub type InvokeFn = fn(&Contract, &mut TxContext<'_>, &Caller, &[String]) -> ChannelResult<String>;

/// Read-only method
pub type QueryFn = fn(&Contract, &TxContext<'_>, &[String]) -> ChannelResult<String>;

/// How a method is admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Caller-signed; consumes a nonce before any other effect
    Signed,
    /// Issued by the Relay; requires the relay role
    Relay,
    /// Read-only; never writes
    Query,
}

#[derive(Clone, Copy)]
pub enum Handler {
    Invoke(InvokeFn),
    Query(QueryFn),
}

/// A registered method
#[derive(Clone, Copy)]
pub struct Method {
    pub kind: MethodKind,
    pub arity: usize,
    pub handler: Handler,
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("kind", &self.kind)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Methods available on one channel
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<&'static str, Method>,
}

impl MethodRegistry {
    /// Register the methods enabled by `caps`
    pub fn build(caps: &Capabilities, token: Option<&str>) -> ChannelResult<Self> {
        let mut registry = Self::default();

        registry.query("getNonce", 1, contract::get_nonce);

        if caps.token {
            if token.is_none() {
                return Err(ChannelError::Config(
                    "token capability requires a token symbol".to_string(),
                ));
            }
            registry.invoke("emit", MethodKind::Signed, 2, contract::emit);
            registry.query("balanceOf", 1, contract::balance_of);
        }

        if caps.channel_transfer {
            registry.invoke(
                "channelTransferByCustomer",
                MethodKind::Signed,
                4,
                contract::transfer_by_customer,
            );
            registry.invoke(
                "channelTransferByAdmin",
                MethodKind::Signed,
                5,
                contract::transfer_by_admin,
            );
            registry.invoke("createCCTransferTo", MethodKind::Relay, 1, contract::create_transfer_to);
            registry.invoke("commitCCTransferFrom", MethodKind::Relay, 1, contract::commit_transfer_from);
            registry.invoke("cancelCCTransferFrom", MethodKind::Relay, 1, contract::cancel_transfer_from);
            registry.invoke("deleteCCTransferFrom", MethodKind::Relay, 1, contract::delete_transfer_from);
            registry.invoke("deleteCCTransferTo", MethodKind::Relay, 1, contract::delete_transfer_to);
            registry.query("channelTransferFrom", 1, contract::transfer_from);
            registry.query("channelTransferTo", 1, contract::transfer_to);
            registry.query("channelTransfersFrom", 2, contract::transfers_from);
            registry.query("allowedBalanceOf", 2, contract::allowed_balance_of);
        }

        Ok(registry)
    }

    /// Look up `method` and check its argument count
    pub fn resolve(&self, method: &str, args: &[String]) -> ChannelResult<Method> {
        let entry = self
            .methods
            .get(method)
            .copied()
            .ok_or_else(|| ChannelError::UnknownMethod(method.to_string()))?;

        if entry.arity != args.len() {
            return Err(ChannelError::InvalidArguments {
                method: method.to_string(),
                expected: entry.arity,
                got: args.len(),
            });
        }
        Ok(entry)
    }

    /// Registered method names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn invoke(&mut self, name: &'static str, kind: MethodKind, arity: usize, f: InvokeFn) {
        self.methods.insert(
            name,
            Method {
                kind,
                arity,
                handler: Handler::Invoke(f),
            },
        );
    }

    fn query(&mut self, name: &'static str, arity: usize, f: QueryFn) {
        self.methods.insert(
            name,
            Method {
                kind: MethodKind::Query,
                arity,
                handler: Handler::Query(f),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_select_methods() {
        let bare = MethodRegistry::build(&Capabilities::default(), None).unwrap();
        assert_eq!(bare.names(), vec!["getNonce"]);

        let transfer_only = Capabilities {
            token: false,
            channel_transfer: true,
        };
        let registry = MethodRegistry::build(&transfer_only, None).unwrap();
        assert!(registry.resolve("emit", &["a".into(), "1".into()]).is_err());
        assert_eq!(
            registry.resolve("createCCTransferTo", &["{}".into()]).unwrap().kind,
            MethodKind::Relay
        );
    }

    #[test]
    fn test_token_capability_needs_symbol() {
        let caps = Capabilities {
            token: true,
            channel_transfer: false,
        };
        assert!(matches!(
            MethodRegistry::build(&caps, None).unwrap_err(),
            ChannelError::Config(_)
        ));
        let registry = MethodRegistry::build(&caps, Some("FIAT")).unwrap();
        assert_eq!(registry.names(), vec!["balanceOf", "emit", "getNonce"]);
    }

    #[test]
    fn test_resolve_errors() {
        let registry = MethodRegistry::build(&Capabilities::default(), None).unwrap();
        assert_eq!(
            registry.resolve("nope", &[]).unwrap_err(),
            ChannelError::UnknownMethod("nope".into())
        );
        assert_eq!(
            registry.resolve("getNonce", &[]).unwrap_err(),
            ChannelError::InvalidArguments {
                method: "getNonce".into(),
                expected: 1,
                got: 0
            }
        );
    }
}
