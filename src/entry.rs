use crate::tier::TierId;
use crate::vclock::VectorClock;

use std::sync::atomic::{AtomicU64, Ordering};

/// Metadata for one cached key. The value bytes themselves live in the
/// owning tier's backend; the engine keeps everything it needs for expiry,
/// eviction, placement, and conflict detection in memory.
///
/// Entries are immutable apart from the access statistics; a write replaces
/// the whole entry (carrying counters forward on overwrite, resetting them
/// on recreation after a remove).
#[derive(Debug)]
pub struct CacheEntry {
  /// Creation time in nanoseconds since the engine epoch. Survives
  /// overwrites of the same key.
  pub created_at: u64,
  /// Time of the last local or merged remote write, in wall-clock
  /// nanoseconds since the UNIX epoch ([`Clock::wall_nanos`]). Unlike the
  /// other timestamps it must be comparable across writers, because
  /// timestamp-based conflict resolution compares it with remote
  /// sync-message timestamps.
  ///
  /// [`Clock::wall_nanos`]: crate::clock::Clock::wall_nanos
  pub updated_at: u64,
  /// Absolute expiry in nanoseconds; the entry is treated as absent once
  /// the clock passes it. Always >= created_at when present.
  pub expires_at: Option<u64>,
  /// Last successful read, in nanoseconds. Cheap atomic store.
  pub last_accessed: AtomicU64,
  /// Monotonically increasing per successful read.
  pub access_count: AtomicU64,
  /// The tier that currently owns this entry. Exactly one at a time.
  pub tier: TierId,
  pub encrypted: bool,
  /// Serialized byte length, for per-tier usage accounting.
  pub size: u64,
  /// Local write counter, bumped on every local write.
  pub version: u64,
  /// Causal history across writers.
  pub vclock: VectorClock,
}

impl CacheEntry {
  pub(crate) fn is_expired(&self, now_nanos: u64) -> bool {
    match self.expires_at {
      Some(at) => now_nanos > at,
      None => false,
    }
  }

  #[inline]
  pub(crate) fn touch(&self, now_nanos: u64) {
    self.last_accessed.store(now_nanos, Ordering::Relaxed);
    self.access_count.fetch_add(1, Ordering::Relaxed);
  }

  pub fn access_count(&self) -> u64 {
    self.access_count.load(Ordering::Relaxed)
  }

  /// Clones the entry for an in-place metadata update (e.g. a tier move),
  /// preserving access statistics.
  pub(crate) fn clone_with_tier(&self, tier: TierId) -> CacheEntry {
    CacheEntry {
      created_at: self.created_at,
      updated_at: self.updated_at,
      expires_at: self.expires_at,
      last_accessed: AtomicU64::new(self.last_accessed.load(Ordering::Relaxed)),
      access_count: AtomicU64::new(self.access_count.load(Ordering::Relaxed)),
      tier,
      encrypted: self.encrypted,
      size: self.size,
      version: self.version,
      vclock: self.vclock.clone(),
    }
  }
}
