use crate::tier::TierId;

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, internal metrics collector for the engine.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) updates: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  pub(crate) evicted_by_capacity: CachePadded<AtomicU64>,
  pub(crate) expired: CachePadded<AtomicU64>,

  // Sync layer
  pub(crate) sync_applied: CachePadded<AtomicU64>,
  pub(crate) sync_conflicts: CachePadded<AtomicU64>,
  pub(crate) sync_discarded: CachePadded<AtomicU64>,
}

/// Per-tier slice of a stats snapshot.
#[derive(Debug, Clone)]
pub struct TierStats {
  pub tier: TierId,
  pub hits: u64,
  pub misses: u64,
  pub item_count: u64,
  pub bytes_used: u64,
}

/// A point-in-time, public-facing snapshot of the cache's state.
#[derive(Debug, Clone)]
pub struct CacheStats {
  pub per_tier: Vec<TierStats>,
  /// hits / (hits + misses) across all tiers; 0.0 before any lookup.
  pub overall_hit_rate: f64,
  pub hits: u64,
  pub misses: u64,
  pub inserts: u64,
  pub updates: u64,
  pub invalidations: u64,
  pub evicted_by_capacity: u64,
  pub expired: u64,
  pub sync_applied: u64,
  pub sync_conflicts: u64,
  pub sync_discarded: u64,
}

impl Metrics {
  pub(crate) fn snapshot(&self, per_tier: Vec<TierStats>) -> CacheStats {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let lookups = hits + misses;

    CacheStats {
      per_tier,
      overall_hit_rate: if lookups == 0 {
        0.0
      } else {
        hits as f64 / lookups as f64
      },
      hits,
      misses,
      inserts: self.inserts.load(Ordering::Relaxed),
      updates: self.updates.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      evicted_by_capacity: self.evicted_by_capacity.load(Ordering::Relaxed),
      expired: self.expired.load(Ordering::Relaxed),
      sync_applied: self.sync_applied.load(Ordering::Relaxed),
      sync_conflicts: self.sync_conflicts.load(Ordering::Relaxed),
      sync_discarded: self.sync_discarded.load(Ordering::Relaxed),
    }
  }
}
