//! Configuration management for the channel transfer node
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::types::is_valid_ident;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CHANNEL_TRANSFER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid pattern");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub node: NodeConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub nonce: NonceConfig,
    pub channels: HashMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub instance_id: String,
    /// Capacity of each channel's event broadcast buffer
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

/// Replay protection parameters shared by every channel on this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NonceConfig {
    /// Out-of-order tolerance in milliseconds; 0 enforces strict increase
    #[serde(default = "default_nonce_ttl")]
    pub ttl_ms: u64,
    /// Exclusive lower bound a nonce must exceed to pass as a millisecond timestamp
    #[serde(default = "default_nonce_min")]
    pub min_value: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_nonce_ttl(),
            min_value: default_nonce_min(),
        }
    }
}

/// Optional contract features of a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Capabilities {
    /// Issues its own token (`emit`, `balanceOf`)
    #[serde(default)]
    pub token: bool,
    /// Takes part in cross-channel transfers
    #[serde(default)]
    pub channel_transfer: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Symbol of the channel's own token
    pub token: Option<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub enabled: bool,
}

fn default_event_buffer() -> usize {
    1024
}

fn default_nonce_ttl() -> u64 {
    50_000
}

fn default_nonce_min() -> u64 {
    1_000_000_000_000
}

impl Settings {
    /// Load settings from `CHANNEL_TRANSFER_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        // At least one channel must be enabled
        if self.enabled_channels().is_empty() {
            anyhow::bail!("At least one channel must be enabled");
        }

        if self.node.event_buffer == 0 {
            anyhow::bail!("node.event_buffer must be positive");
        }

        if self.nonce.min_value == 0 {
            anyhow::bail!("nonce.min_value must be positive");
        }

        for (name, channel) in &self.channels {
            if !is_valid_ident(name) {
                anyhow::bail!("Invalid channel name {:?}", name);
            }
            if !channel.enabled {
                continue;
            }

            match channel.token.as_deref() {
                Some(token) => {
                    if !is_valid_ident(token) {
                        anyhow::bail!("Channel {} has an invalid token symbol", name);
                    }
                    // Transfers route a native asset by the name of its home channel
                    if token != name {
                        anyhow::bail!(
                            "Channel {} issues token {}; a channel's token must carry the channel name",
                            name,
                            token
                        );
                    }
                }
                None if channel.capabilities.token => {
                    anyhow::bail!("Channel {} has the token capability but no token symbol", name);
                }
                None => {}
            }

            if !channel.capabilities.token && !channel.capabilities.channel_transfer {
                tracing::warn!("Channel {} has no capabilities - only queries will resolve", name);
            }
        }

        Ok(())
    }

    /// Get list of enabled channels, sorted by name
    pub fn enabled_channels(&self) -> Vec<(&String, &ChannelConfig)> {
        let mut channels: Vec<_> = self.channels.iter().filter(|(_, c)| c.enabled).collect();
        channels.sort_by(|a, b| a.0.cmp(b.0));
        channels
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures<'_>| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
