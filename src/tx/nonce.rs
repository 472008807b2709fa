//! Nonce admission for caller-signed invocations
//!
//! Handles:
//! - Format check against a minimum millisecond-timestamp magnitude
//! - Strict monotonic mode when no tolerance window is configured
//! - Out-of-order acceptance inside a TTL window, with pruning
//! - Persisting the per-account window in the invocation's write set

use super::context::TxContext;
use crate::config::NonceConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::state::composite_key;
use crate::types::Address;

use serde::{Deserialize, Serialize};
use tracing::debug;

const NONCE_KEY_TYPE: &str = "nonce";

/// Serialized form of an account that has never been admitted
pub const EMPTY_WINDOW_JSON: &str = "\"0\"";

/// Tolerance window for out-of-order nonces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceTtl {
    /// Track only the latest value, enforce strict increase
    NoWindow,
    /// Accept values up to this many milliseconds behind the newest one
    Millis(u64),
}

impl From<u64> for NonceTtl {
    fn from(ms: u64) -> Self {
        if ms == 0 {
            NonceTtl::NoWindow
        } else {
            NonceTtl::Millis(ms)
        }
    }
}

/// Admission parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoncePolicy {
    pub ttl: NonceTtl,
    /// Nonces must exceed this to pass as a millisecond timestamp
    pub min_value: u64,
}

impl From<&NonceConfig> for NoncePolicy {
    fn from(config: &NonceConfig) -> Self {
        Self {
            ttl: NonceTtl::from(config.ttl_ms),
            min_value: config.min_value,
        }
    }
}

impl Default for NoncePolicy {
    fn default() -> Self {
        Self::from(&NonceConfig::default())
    }
}

/// Strictly ascending list of accepted nonces for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NonceWindow(Vec<u64>);

impl NonceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[u64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max(&self) -> Option<u64> {
        self.0.last().copied()
    }

    pub fn min(&self) -> Option<u64> {
        self.0.first().copied()
    }

    /// Wire form returned by `getNonce`
    pub fn to_json(&self) -> ChannelResult<String> {
        if self.0.is_empty() {
            return Ok(EMPTY_WINDOW_JSON.to_string());
        }
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl From<Vec<u64>> for NonceWindow {
    fn from(mut values: Vec<u64>) -> Self {
        values.sort_unstable();
        values.dedup();
        Self(values)
    }
}

/// Decide whether `candidate` may be accepted after `window`
///
/// On success returns the window to persist; on failure the caller keeps
/// the old window untouched.
pub fn admit(candidate: u64, window: &NonceWindow, policy: &NoncePolicy) -> ChannelResult<NonceWindow> {
    if candidate <= policy.min_value {
        return Err(ChannelError::MalformedNonce);
    }

    let ttl = match policy.ttl {
        NonceTtl::NoWindow => {
            if let Some(max) = window.max() {
                if candidate <= max {
                    return Err(ChannelError::NonceTooOld {
                        candidate,
                        reference: max,
                    });
                }
            }
            return Ok(NonceWindow(vec![candidate]));
        }
        NonceTtl::Millis(ttl) => ttl,
    };

    let position = match window.0.binary_search(&candidate) {
        Ok(_) => return Err(ChannelError::NonceAlreadyUsed { candidate }),
        Err(position) => position,
    };

    if let (Some(max), Some(min)) = (window.max(), window.min()) {
        if candidate < max && max - candidate > ttl {
            return Err(ChannelError::NonceTooOld {
                candidate,
                reference: min,
            });
        }
    }

    let mut values = Vec::with_capacity(window.0.len() + 1);
    values.extend_from_slice(&window.0[..position]);
    values.push(candidate);
    values.extend_from_slice(&window.0[position..]);

    let new_max = values[values.len() - 1];
    let keep_from = values.partition_point(|v| new_max - v > ttl);
    values.drain(..keep_from);

    Ok(NonceWindow(values))
}

/// Parse a nonce as sent on the wire: plain decimal digits only
pub fn parse_nonce(raw: &str) -> ChannelResult<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChannelError::MalformedNonce);
    }
    raw.parse().map_err(|_| ChannelError::MalformedNonce)
}

/// Loads, admits and stores nonce windows inside an invocation
#[derive(Debug, Clone)]
pub struct NonceGuard {
    policy: NoncePolicy,
}

impl NonceGuard {
    pub fn new(policy: NoncePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &NoncePolicy {
        &self.policy
    }

    /// Current window of `address` as seen by `tx`
    pub fn window(&self, tx: &TxContext<'_>, address: &Address) -> ChannelResult<NonceWindow> {
        let key = nonce_key(address)?;
        Ok(tx.get_json(&key)?.unwrap_or_default())
    }

    /// Admit `nonce` for `address`, staging the new window in `tx`
    pub fn check(&self, tx: &mut TxContext<'_>, address: &Address, nonce: u64) -> ChannelResult<()> {
        let key = nonce_key(address)?;
        let window: NonceWindow = tx.get_json(&key)?.unwrap_or_default();
        let next = admit(nonce, &window, &self.policy)?;

        debug!(
            "Admitted nonce {} for {} (window size {})",
            nonce,
            address,
            next.values().len()
        );

        tx.put_json(key, &next)
    }
}

fn nonce_key(address: &Address) -> ChannelResult<String> {
    composite_key(NONCE_KEY_TYPE, &[address.as_str()])
}
