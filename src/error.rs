use crate::tier::TierId;

use std::fmt;

/// Errors surfaced by the cache engine at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheError {
  /// The key or options were malformed. Never retried by the engine;
  /// the caller must fix the input.
  Validation(String),
  /// The value has no wire representation (e.g. a non-finite float).
  /// The entry is not created.
  Serialization(String),
  /// The caller explicitly requested a tier that is not registered or
  /// currently unavailable.
  TierUnavailable(TierId),
  /// No registered tier is available to own the entry.
  NoBackendAvailable,
  /// A storage backend failed. Reported per key; batch operations carry
  /// one of these per failed item instead of failing wholesale.
  Backend { tier: TierId, message: String },
  /// A `get_or_compute` future did not resolve within the caller's budget.
  /// The in-flight compute is abandoned and its result discarded.
  Timeout,
}

impl fmt::Display for CacheError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheError::Validation(msg) => write!(f, "invalid input: {}", msg),
      CacheError::Serialization(msg) => write!(f, "value cannot be serialized: {}", msg),
      CacheError::TierUnavailable(tier) => write!(f, "requested tier '{}' is unavailable", tier),
      CacheError::NoBackendAvailable => write!(f, "no storage backend is available"),
      CacheError::Backend { tier, message } => {
        write!(f, "backend '{}' failed: {}", tier, message)
      }
      CacheError::Timeout => write!(f, "operation timed out"),
    }
  }
}

impl std::error::Error for CacheError {}

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with a capacity of zero entries.
  ZeroCapacity,
  /// The cache was configured with zero shards, which is not allowed.
  ZeroShards,
  /// No storage tier was registered.
  NoTiers,
  /// The configured default tier does not match any registered tier.
  UnknownDefaultTier(String),
  /// The writer id used for vector-clock bumps cannot be empty.
  EmptyWriterId,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroCapacity => write!(f, "cache capacity cannot be zero"),
      BuildError::ZeroShards => write!(f, "shard count cannot be zero"),
      BuildError::NoTiers => write!(f, "at least one storage tier must be registered"),
      BuildError::UnknownDefaultTier(name) => {
        write!(f, "default tier '{}' is not registered", name)
      }
      BuildError::EmptyWriterId => write!(f, "writer id cannot be empty"),
    }
  }
}

impl std::error::Error for BuildError {}
