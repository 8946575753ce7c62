pub mod coordinator;
pub mod message;
pub(crate) mod queue;

pub use coordinator::{
  ConflictAudit, ConflictChoice, ConflictContext, ConflictHook, ConflictOutcome,
  ConflictResolver, ConflictStrategy, SyncConfig, SyncCoordinator, SyncHandle,
};
pub use message::{SyncMessage, SyncOp};
