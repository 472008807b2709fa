//! Channel Transfer - replay protection and cross-channel transfer saga
//!
//! Each channel hosts balances on its own ledger. Caller-signed invocations
//! pass nonce admission before any other effect; value moves between
//! channels as two independent transfer records driven by an external Relay.

pub mod api;
pub mod balance;
pub mod chain;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod metrics;
pub mod state;
pub mod tx;
pub mod types;

pub use error::{ChannelError, ChannelResult, ErrorKind};
