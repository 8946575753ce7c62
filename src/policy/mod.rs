pub mod fifo;
pub mod hybrid;
pub mod lfu;
pub mod lru;
mod lru_list;
pub mod mru;
pub mod random;
pub mod ttl;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// A trait for implementing eviction policies.
///
/// The policy tracks access order and frequency per key, independent of
/// where the bytes live. All implementations use interior mutability so a
/// shared policy can be driven from concurrent operations.
pub trait EvictionPolicy: Send + Sync {
  /// Called on every successful read. O(1) amortized.
  fn on_access(&self, key: &str);

  /// Called on every successful write of a new key. O(1) amortized.
  fn on_add(&self, key: &str, ttl: Option<Duration>);

  /// Returns the key that should be evicted next, without mutating state.
  ///
  /// The result is advisory: the orchestrator re-validates that the key
  /// still exists before evicting, and queries again on a stale candidate.
  fn victim(&self) -> Option<String>;

  /// Called when a key is deleted for any reason. O(1) amortized.
  fn on_remove(&self, key: &str);

  /// Drops all tracked state.
  fn clear(&self);

  /// Number of keys currently tracked.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Feedback on the outcome of a lookup (hit or miss). Only the adaptive
  /// hybrid policy consumes this; the rest ignore it.
  fn record_outcome(&self, _hit: bool) {}
}

/// The built-in policy variants selectable from the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
  Lru,
  Lfu,
  Fifo,
  Mru,
  Random,
  TtlAware,
  AdaptiveHybrid,
}

impl PolicyKind {
  pub(crate) fn instantiate(self, clock: Arc<dyn Clock>) -> Arc<dyn EvictionPolicy> {
    match self {
      PolicyKind::Lru => Arc::new(lru::LruPolicy::new()),
      PolicyKind::Lfu => Arc::new(lfu::LfuPolicy::new()),
      PolicyKind::Fifo => Arc::new(fifo::FifoPolicy::new()),
      PolicyKind::Mru => Arc::new(mru::MruPolicy::new()),
      PolicyKind::Random => Arc::new(random::RandomPolicy::new()),
      PolicyKind::TtlAware => Arc::new(ttl::TtlPolicy::new(clock)),
      PolicyKind::AdaptiveHybrid => Arc::new(hybrid::HybridPolicy::new()),
    }
  }
}
