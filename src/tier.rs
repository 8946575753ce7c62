use crate::traits::StorageBackend;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a registered storage tier (e.g. "fast", "durable").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TierId(Arc<str>);

impl TierId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for TierId {
  fn from(name: &str) -> Self {
    TierId(Arc::from(name))
  }
}

impl fmt::Display for TierId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// EWMA smoothing for the per-tier latency estimate (1/8 new, 7/8 old).
const LATENCY_EWMA_SHIFT: u64 = 3;

/// A registered backend plus its running counters.
pub(crate) struct RegisteredTier {
  pub(crate) id: TierId,
  pub(crate) backend: Arc<dyn StorageBackend>,
  pub(crate) hits: AtomicU64,
  pub(crate) misses: AtomicU64,
  available: AtomicBool,
  latency_nanos: AtomicU64,
}

impl RegisteredTier {
  fn new(id: TierId, backend: Arc<dyn StorageBackend>) -> Self {
    Self {
      id,
      backend,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      available: AtomicBool::new(true),
      latency_nanos: AtomicU64::new(0),
    }
  }

  /// Availability check with a lazy re-probe: the backend's own probe is
  /// always consulted, and a tier marked down after an IO failure is
  /// restored once the probe answers alive again.
  pub(crate) fn is_available(&self) -> bool {
    if !self.backend.is_available() {
      self.available.store(false, Ordering::Relaxed);
      return false;
    }
    if !self.available.load(Ordering::Relaxed) {
      self.available.store(true, Ordering::Relaxed);
    }
    true
  }

  pub(crate) fn mark_unavailable(&self) {
    self.available.store(false, Ordering::Relaxed);
  }

  /// Folds an observed operation latency into the EWMA. Feeds the
  /// selector's learning mode.
  pub(crate) fn observe_latency(&self, nanos: u64) {
    let prev = self.latency_nanos.load(Ordering::Relaxed);
    let next = if prev == 0 {
      nanos
    } else {
      prev - (prev >> LATENCY_EWMA_SHIFT) + (nanos >> LATENCY_EWMA_SHIFT)
    };
    self.latency_nanos.store(next, Ordering::Relaxed);
  }

  pub(crate) fn avg_latency_nanos(&self) -> u64 {
    self.latency_nanos.load(Ordering::Relaxed)
  }
}

/// The set of registered tiers, in priority order (index 0 is the fastest,
/// preferred tier). Fixed at construction; tiers are never removed, only
/// flagged unavailable.
pub(crate) struct TierRegistry {
  tiers: Vec<RegisteredTier>,
}

impl TierRegistry {
  pub(crate) fn new(tiers: Vec<(TierId, Arc<dyn StorageBackend>)>) -> Self {
    Self {
      tiers: tiers
        .into_iter()
        .map(|(id, backend)| RegisteredTier::new(id, backend))
        .collect(),
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.tiers.len()
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = &RegisteredTier> {
    self.tiers.iter()
  }

  pub(crate) fn by_id(&self, id: &TierId) -> Option<&RegisteredTier> {
    self.tiers.iter().find(|tier| &tier.id == id)
  }

  pub(crate) fn by_index(&self, index: usize) -> Option<&RegisteredTier> {
    self.tiers.get(index)
  }

  pub(crate) fn index_of(&self, id: &TierId) -> Option<usize> {
    self.tiers.iter().position(|tier| &tier.id == id)
  }

  /// First tier in priority order that answers its availability probe.
  pub(crate) fn first_available(&self) -> Option<&RegisteredTier> {
    self.tiers.iter().find(|tier| tier.is_available())
  }
}
