//! Cross-channel transfer coordination
//!
//! Each channel runs its own half of a transfer:
//! 1. The source escrows the owner's funds and records a `From` record
//! 2. The Relay replays the record on the destination, which credits the owner
//! 3. The Relay commits (or, if the destination never saw it, cancels) the source
//! 4. Both records are garbage-collected

pub mod coordinator;
pub mod record;
pub mod store;

pub use coordinator::{InitiateTransfer, TransferCoordinator, TransferMode};
pub use record::{Side, TransferPage, TransferRecord, TransferStatus};
pub use store::TransferStore;
