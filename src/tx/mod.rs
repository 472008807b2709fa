//! Invocation transaction support: buffered ledger access and replay protection

mod context;
mod nonce;

pub use context::TxContext;
pub use nonce::{admit, parse_nonce, NonceGuard, NoncePolicy, NonceTtl, NonceWindow, EMPTY_WINDOW_JSON};
