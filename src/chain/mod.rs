//! Chain module - hosts the configured channels
//!
//! This module provides:
//! - Per-channel contract methods and the capability-driven method registry
//! - Serialized invocation with nonce admission and post-commit event publication
//! - A registry of all channels hosted by this node

pub mod channel;
pub mod contract;
pub mod registry;

pub use channel::{Channel, InvokeRequest, InvokeResponse};
pub use contract::Contract;
pub use registry::{MethodKind, MethodRegistry};

use crate::config::Settings;
use crate::error::{ChannelError, ChannelResult};
use crate::state::{Ledger, MemoryLedger};
use crate::tx::NoncePolicy;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Owns every channel hosted by this node
#[derive(Debug, Default)]
pub struct ChannelManager {
    /// Channels indexed by name
    channels: DashMap<String, Arc<Channel>>,
}

impl ChannelManager {
    /// Create a manager with an in-memory ledger per enabled channel
    pub fn new(settings: &Settings) -> ChannelResult<Self> {
        let manager = Self::default();
        let policy = NoncePolicy::from(&settings.nonce);

        for (name, config) in settings.enabled_channels() {
            let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
            let channel = Channel::new(
                name.clone(),
                config,
                policy,
                ledger,
                settings.node.event_buffer,
            )?;

            info!(
                "Channel {} ready (token: {}, methods: {})",
                name,
                config.token.as_deref().unwrap_or("-"),
                channel.methods().len()
            );
            manager.insert(channel)?;
        }

        Ok(manager)
    }

    /// Register a channel; names are unique
    pub fn insert(&self, channel: Channel) -> ChannelResult<Arc<Channel>> {
        let name = channel.name().to_string();
        if self.channels.contains_key(&name) {
            return Err(ChannelError::Config(format!("channel {} registered twice", name)));
        }
        let channel = Arc::new(channel);
        self.channels.insert(name, channel.clone());
        Ok(channel)
    }

    /// Get a channel by name
    pub fn get(&self, name: &str) -> ChannelResult<Arc<Channel>> {
        self.channels
            .get(name)
            .map(|c| c.clone())
            .ok_or_else(|| ChannelError::ChannelNotFound(name.to_string()))
    }

    /// Hosted channel names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Health check for all channels
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let channels: Vec<Arc<Channel>> = self.channels.iter().map(|e| e.value().clone()).collect();
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels {
            let healthy = channel.query("getNonce", &["health".to_string()]).await.is_ok();
            crate::metrics::record_channel_health(channel.name(), healthy);
            results.push((channel.name().to_string(), healthy));
        }

        results.sort();
        results
    }
}
