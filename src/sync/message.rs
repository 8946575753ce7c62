use crate::error::CacheError;
use crate::vclock::VectorClock;

use serde::{Deserialize, Serialize};

/// The mutation a sync message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOp {
  Set,
  Remove,
  Clear,
}

/// One observed mutation, serialized and shipped to peer writers.
///
/// Immutable once constructed; the receiving coordinator consumes it exactly
/// once. The transport carries the encoded blob opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
  pub key: String,
  pub op: SyncOp,
  /// Serialized value bytes for `Set`; absent for `Remove`/`Clear`.
  pub payload: Option<Vec<u8>>,
  pub version: u64,
  pub vclock: VectorClock,
  /// The writer that produced this mutation.
  pub origin: String,
  /// Wall-clock nanoseconds since the UNIX epoch at the origin
  /// ([`Clock::wall_nanos`]), so timestamps from different processes and
  /// machines stay comparable; the timestamp-based conflict resolvers
  /// order concurrent writes by it.
  ///
  /// [`Clock::wall_nanos`]: crate::clock::Clock::wall_nanos
  pub timestamp: u64,
}

/// Encodes a flushed batch as one opaque blob for `Broadcast::publish`.
pub(crate) fn encode_batch(batch: &[SyncMessage]) -> Result<Vec<u8>, CacheError> {
  bincode::serialize(batch).map_err(|e| CacheError::Serialization(e.to_string()))
}

pub(crate) fn decode_batch(bytes: &[u8]) -> Result<Vec<SyncMessage>, CacheError> {
  bincode::deserialize(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
}
