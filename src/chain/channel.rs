//! One hosted channel: serialized invocation over an injected ledger
//!
//! The `caller` of an invocation is trusted as given. Whatever carries
//! requests here (the HTTP API included) must sit behind the identity layer
//! that authenticates the address and assigns the role.

use super::contract::Contract;
use super::registry::{Handler, MethodKind, MethodRegistry};
use crate::config::ChannelConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::events::PublishedEvent;
use crate::metrics;
use crate::state::Ledger;
use crate::tx::{parse_nonce, NoncePolicy, TxContext};
use crate::types::{Caller, Role};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// A state-mutating call
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeRequest {
    pub method: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Authenticated upstream; not verified here
    pub caller: Caller,
    /// Required for signed methods
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    pub tx_id: String,
    pub payload: String,
}

/// A channel's contract bound to its ledger
pub struct Channel {
    name: String,
    ledger: Arc<dyn Ledger>,
    contract: Contract,
    registry: MethodRegistry,
    /// Serializes invocations on this channel
    exec: Mutex<()>,
    events: broadcast::Sender<PublishedEvent>,
}

impl Channel {
    pub fn new(
        name: impl Into<String>,
        config: &ChannelConfig,
        policy: NoncePolicy,
        ledger: Arc<dyn Ledger>,
        event_buffer: usize,
    ) -> ChannelResult<Self> {
        let name = name.into();
        if let Some(token) = config.token.as_deref() {
            if token != name {
                return Err(ChannelError::Config(format!(
                    "channel {} cannot issue token {}: native assets are named after their channel",
                    name, token
                )));
            }
        }
        let registry = MethodRegistry::build(&config.capabilities, config.token.as_deref())
            .map_err(|e| ChannelError::Config(format!("channel {}: {}", name, e)))?;
        let (events, _) = broadcast::channel(event_buffer.max(1));

        Ok(Self {
            contract: Contract::new(name.clone(), config.token.clone(), policy),
            name,
            ledger,
            registry,
            exec: Mutex::new(()),
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> Option<&str> {
        self.contract.token()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// Subscribe to events published after each successful invocation
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }

    /// Run one invocation to completion; on failure nothing is written
    pub async fn invoke(&self, req: InvokeRequest) -> ChannelResult<InvokeResponse> {
        let _guard = self.exec.lock().await;
        let started = Instant::now();

        let result = self.execute(&req);
        metrics::record_invocation_latency(&self.name, &req.method, started.elapsed().as_secs_f64());

        match &result {
            Ok(response) => {
                metrics::record_invocation(&self.name, &req.method, "ok");
                debug!("{}.{} committed as {}", self.name, req.method, response.tx_id);
            }
            Err(e) => {
                metrics::record_invocation(&self.name, &req.method, e.kind().as_str());
                if e.is_nonce_rejection() {
                    metrics::record_nonce_rejection(&self.name);
                }
                warn!(
                    "{}.{} by {} rejected: {}",
                    self.name, req.method, req.caller.address, e
                );
            }
        }
        result
    }

    /// Evaluate a read-only method against committed state
    pub async fn query(&self, method: &str, args: &[String]) -> ChannelResult<String> {
        let entry = self.registry.resolve(method, args)?;
        let Handler::Query(handler) = entry.handler else {
            return Err(ChannelError::UnknownMethod(method.to_string()));
        };

        // Shares the lock so a query never observes a half-applied commit
        let _guard = self.exec.lock().await;
        let tx = TxContext::new(self.ledger.as_ref());
        handler(&self.contract, &tx, args)
    }

    fn execute(&self, req: &InvokeRequest) -> ChannelResult<InvokeResponse> {
        let entry = self.registry.resolve(&req.method, &req.args)?;
        let mut tx = TxContext::new(self.ledger.as_ref());

        match entry.kind {
            MethodKind::Signed => {
                let raw = req.nonce.as_deref().ok_or(ChannelError::MalformedNonce)?;
                let nonce = parse_nonce(raw)?;
                self.contract
                    .nonces()
                    .check(&mut tx, &req.caller.address, nonce)?;
            }
            MethodKind::Relay => {
                if req.caller.role != Role::Relay {
                    return Err(ChannelError::Unauthorized(format!(
                        "{} requires the relay role",
                        req.method
                    )));
                }
            }
            MethodKind::Query => {}
        }

        let payload = match entry.handler {
            Handler::Invoke(handler) => handler(&self.contract, &mut tx, &req.caller, &req.args)?,
            Handler::Query(handler) => handler(&self.contract, &tx, &req.args)?,
        };

        let tx_id = tx.tx_id().to_string();
        let events = tx.commit()?;
        for event in events {
            metrics::record_event(&self.name, &event);
            // No subscribers is not an error
            let _ = self.events.send(PublishedEvent {
                channel: self.name.clone(),
                tx_id: tx_id.clone(),
                event,
            });
        }

        Ok(InvokeResponse { tx_id, payload })
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("token", &self.contract.token())
            .field("methods", &self.registry.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Capabilities;
    use crate::events::ChannelEvent;
    use crate::state::MemoryLedger;
    use crate::types::Address;

    fn fiat() -> Channel {
        let config = ChannelConfig {
            token: Some("FIAT".into()),
            capabilities: Capabilities {
                token: true,
                channel_transfer: true,
            },
            enabled: true,
        };
        Channel::new("FIAT", &config, NoncePolicy::default(), Arc::new(MemoryLedger::new()), 16).unwrap()
    }

    fn request(method: &str, args: &[&str], role: Role, nonce: Option<u64>) -> InvokeRequest {
        InvokeRequest {
            method: method.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            caller: Caller::new(Address::parse("admin").unwrap(), role),
            nonce: nonce.map(|n| n.to_string()),
        }
    }

    #[tokio::test]
    async fn test_signed_invoke_consumes_nonce() {
        let channel = fiat();
        let mut events = channel.subscribe();

        let response = channel
            .invoke(request("emit", &["user1", "1000"], Role::Admin, Some(1660055050000)))
            .await
            .unwrap();
        assert_eq!(response.payload, "\"1000\"");

        let published = events.recv().await.unwrap();
        assert_eq!(published.tx_id, response.tx_id);
        assert!(matches!(published.event, ChannelEvent::Emitted { .. }));

        let err = channel
            .invoke(request("emit", &["user1", "1"], Role::Admin, Some(1660055050000)))
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError::NonceAlreadyUsed { candidate: 1660055050000 });

        let err = channel
            .invoke(request("emit", &["user1", "1"], Role::Admin, None))
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError::MalformedNonce);

        let nonce = channel.query("getNonce", &["admin".into()]).await.unwrap();
        assert_eq!(nonce, "[1660055050000]");
    }

    #[tokio::test]
    async fn test_failed_invoke_writes_nothing() {
        let channel = fiat();

        // Customer may not emit; the nonce it carried is not consumed
        let err = channel
            .invoke(request("emit", &["user1", "1000"], Role::Customer, Some(1660055050000)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unauthorized(_)));
        assert_eq!(channel.query("getNonce", &["admin".into()]).await.unwrap(), "\"0\"");
        assert_eq!(channel.query("balanceOf", &["user1".into()]).await.unwrap(), "\"0\"");
    }

    #[tokio::test]
    async fn test_relay_methods_need_relay_role() {
        let channel = fiat();

        let err = channel
            .invoke(request("commitCCTransferFrom", &["t1"], Role::Admin, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unauthorized(_)));

        let err = channel
            .invoke(request("commitCCTransferFrom", &["t1"], Role::Relay, None))
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError::TransferNotFound { id: "t1".into() });
    }

    #[test]
    fn test_token_must_match_channel_name() {
        let config = ChannelConfig {
            token: Some("FIAT".into()),
            capabilities: Capabilities {
                token: true,
                channel_transfer: true,
            },
            enabled: true,
        };
        let err = Channel::new("fiatch", &config, NoncePolicy::default(), Arc::new(MemoryLedger::new()), 16)
            .unwrap_err();
        assert!(matches!(err, ChannelError::Config(_)));
    }

    #[tokio::test]
    async fn test_query_rejects_mutating_methods() {
        let channel = fiat();
        let err = channel
            .query("emit", &["user1".into(), "1".into()])
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError::UnknownMethod("emit".into()));
    }
}
