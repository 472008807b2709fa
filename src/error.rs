//! Error types for the channel transfer node

use thiserror::Error;

/// Main error type for channel invocations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("incorrect nonce format")]
    MalformedNonce,

    #[error("incorrect nonce {candidate}, less than {reference}")]
    NonceTooOld { candidate: u64, reference: u64 },

    #[error("nonce {candidate} already exists")]
    NonceAlreadyUsed { candidate: u64 },

    #[error("amount should be more than zero")]
    InvalidAmount,

    #[error("Invalid amount literal: {0}")]
    MalformedAmount(String),

    #[error("Invalid transfer id: {0}")]
    InvalidTransferId(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Asset {asset} cannot be transferred from {from} to {to}")]
    InvalidAsset {
        asset: String,
        from: String,
        to: String,
    },

    #[error("Source and destination channel are both {0}")]
    SameChannel(String),

    #[error("Malformed transfer snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transfer {id} already exists")]
    DuplicateTransferId { id: String },

    #[error("Insufficient balance for {address}: have {have}, need {need}")]
    InsufficientBalance {
        address: String,
        have: String,
        need: String,
    },

    #[error("Transfer {id} not found")]
    TransferNotFound { id: String },

    #[error("Invalid state transition for transfer {id} from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Transfer {id} is not finalized ({status})")]
    NotFinalized { id: String, status: String },

    #[error("Page size must be positive")]
    InvalidPageSize,

    #[error("Invalid bookmark: {0}")]
    InvalidBookmark(String),

    #[error("Channel {0} not found")]
    ChannelNotFound(String),

    #[error("Unknown method {0}")]
    UnknownMethod(String),

    #[error("Invalid arguments for {method}: expected {expected}, got {got}")]
    InvalidArguments {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers, the Relay and the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Conflict,
    InvalidTransition,
    NotFound,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage",
        }
    }
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::MalformedNonce
            | ChannelError::InvalidAmount
            | ChannelError::MalformedAmount(_)
            | ChannelError::InvalidTransferId(_)
            | ChannelError::InvalidAddress(_)
            | ChannelError::InvalidAsset { .. }
            | ChannelError::SameChannel(_)
            | ChannelError::MalformedSnapshot(_)
            | ChannelError::InvalidPageSize
            | ChannelError::InvalidBookmark(_)
            | ChannelError::UnknownMethod(_)
            | ChannelError::InvalidArguments { .. } => ErrorKind::Validation,

            ChannelError::Unauthorized(_) => ErrorKind::Unauthorized,

            ChannelError::NonceTooOld { .. }
            | ChannelError::NonceAlreadyUsed { .. }
            | ChannelError::DuplicateTransferId { .. }
            | ChannelError::InsufficientBalance { .. } => ErrorKind::Conflict,

            ChannelError::InvalidTransition { .. } | ChannelError::NotFinalized { .. } => {
                ErrorKind::InvalidTransition
            }

            ChannelError::TransferNotFound { .. } | ChannelError::ChannelNotFound(_) => {
                ErrorKind::NotFound
            }

            ChannelError::Config(_) | ChannelError::Storage(_) | ChannelError::Internal(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Check if a Relay should treat this error as "step already done"
    pub fn is_already_applied(&self) -> bool {
        matches!(self, ChannelError::DuplicateTransferId { .. })
    }

    /// Check if the rejection came from replay protection
    pub fn is_nonce_rejection(&self) -> bool {
        matches!(
            self,
            ChannelError::MalformedNonce
                | ChannelError::NonceTooOld { .. }
                | ChannelError::NonceAlreadyUsed { .. }
        )
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::Internal(format!("serialization: {}", e))
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_messages() {
        assert_eq!(ChannelError::MalformedNonce.to_string(), "incorrect nonce format");
        assert_eq!(
            ChannelError::NonceTooOld {
                candidate: 1660055000009,
                reference: 1660055050010
            }
            .to_string(),
            "incorrect nonce 1660055000009, less than 1660055050010"
        );
        assert_eq!(
            ChannelError::NonceAlreadyUsed {
                candidate: 1660055050000
            }
            .to_string(),
            "nonce 1660055050000 already exists"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ChannelError::InvalidAmount.kind(), ErrorKind::Validation);
        assert_eq!(
            ChannelError::DuplicateTransferId { id: "a".into() }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ChannelError::NotFinalized {
                id: "a".into(),
                status: "created".into()
            }
            .kind(),
            ErrorKind::InvalidTransition
        );
        assert!(ChannelError::DuplicateTransferId { id: "a".into() }.is_already_applied());
        assert!(!ChannelError::InvalidAmount.is_already_applied());
        assert!(ChannelError::MalformedNonce.is_nonce_rejection());
    }
}
