use crate::clock::Clock;
use crate::error::CacheError;
use crate::value::CacheValue;

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A bounded LRU-with-TTL cache mapping a value's structural fingerprint to
/// its serialized byte form, so repeated writes of an unchanged value do not
/// re-serialize it.
///
/// Primitive-like values never touch the backing cache; serializing them is
/// cheaper than the bookkeeping.
pub struct SerializationCache {
  state: Mutex<SerialState>,
  fingerprint_state: ahash::RandomState,
  capacity: usize,
  ttl: Option<Duration>,
  clock: Arc<dyn Clock>,
  hits: AtomicU64,
  misses: AtomicU64,
}

struct SerialState {
  entries: HashMap<u64, CachedBytes, ahash::RandomState>,
  // Recency order, front = least recently used.
  order: VecDeque<u64>,
}

struct CachedBytes {
  bytes: Arc<[u8]>,
  stored_at: Duration,
}

impl SerializationCache {
  pub fn new(capacity: usize, ttl: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
    Self {
      state: Mutex::new(SerialState {
        entries: HashMap::with_hasher(ahash::RandomState::new()),
        order: VecDeque::new(),
      }),
      fingerprint_state: ahash::RandomState::new(),
      capacity: capacity.max(1),
      ttl,
      clock,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    }
  }

  /// Returns the serialized bytes for `value`, reusing a cached form when a
  /// structurally equal value was serialized recently.
  pub fn get_or_serialize(&self, value: &CacheValue) -> Result<Arc<[u8]>, CacheError> {
    if value.is_fast_path() {
      return Ok(value.to_wire_bytes()?.into());
    }

    let fingerprint = value.fingerprint(&self.fingerprint_state);
    let now = self.clock.now();

    {
      let mut state = self.state.lock();
      let fresh = match state.entries.get(&fingerprint) {
        Some(cached) => match self.ttl {
          Some(ttl) => now.saturating_sub(cached.stored_at) <= ttl,
          None => true,
        },
        None => false,
      };
      if fresh {
        let bytes = state.entries[&fingerprint].bytes.clone();
        touch(&mut state.order, fingerprint);
        self.hits.fetch_add(1, Ordering::Relaxed);
        return Ok(bytes);
      }
      if state.entries.remove(&fingerprint).is_some() {
        state.order.retain(|&fp| fp != fingerprint);
      }
    }

    // Miss path: serialize outside the lock, then store.
    self.misses.fetch_add(1, Ordering::Relaxed);
    let bytes: Arc<[u8]> = value.to_wire_bytes()?.into();

    let mut state = self.state.lock();
    state.entries.insert(
      fingerprint,
      CachedBytes {
        bytes: bytes.clone(),
        stored_at: now,
      },
    );
    state.order.push_back(fingerprint);
    while state.entries.len() > self.capacity {
      if let Some(oldest) = state.order.pop_front() {
        state.entries.remove(&oldest);
      } else {
        break;
      }
    }

    Ok(bytes)
  }

  pub fn hits(&self) -> u64 {
    self.hits.load(Ordering::Relaxed)
  }

  pub fn misses(&self) -> u64 {
    self.misses.load(Ordering::Relaxed)
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.state.lock().entries.len()
  }
}

fn touch(order: &mut VecDeque<u64>, fingerprint: u64) {
  if let Some(pos) = order.iter().position(|&fp| fp == fingerprint) {
    order.remove(pos);
    order.push_back(fingerprint);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;

  fn structured(n: i64) -> CacheValue {
    CacheValue::Array(vec![CacheValue::Int(n), CacheValue::Str("payload".into())])
  }

  #[test]
  fn fast_path_skips_the_cache() {
    let cache = SerializationCache::new(8, None, ManualClock::new());
    let a = cache.get_or_serialize(&CacheValue::Int(42)).unwrap();
    let b = cache.get_or_serialize(&CacheValue::Int(42)).unwrap();
    assert_eq!(a, b, "structurally equal primitives serialize identically");
    assert_eq!(cache.misses(), 0, "primitives never count as cache misses");
    assert_eq!(cache.len(), 0);
  }

  #[test]
  fn second_serialization_is_a_hit() {
    let cache = SerializationCache::new(8, None, ManualClock::new());
    let a = cache.get_or_serialize(&structured(1)).unwrap();
    assert_eq!(cache.misses(), 1);

    let b = cache.get_or_serialize(&structured(1)).unwrap();
    assert_eq!(a, b);
    assert_eq!(cache.misses(), 1, "second call must not increase misses");
    assert_eq!(cache.hits(), 1);
  }

  #[test]
  fn capacity_evicts_least_recently_used() {
    let cache = SerializationCache::new(2, None, ManualClock::new());
    cache.get_or_serialize(&structured(1)).unwrap();
    cache.get_or_serialize(&structured(2)).unwrap();
    // Refresh 1, then push 3; 2 is the LRU victim.
    cache.get_or_serialize(&structured(1)).unwrap();
    cache.get_or_serialize(&structured(3)).unwrap();
    assert_eq!(cache.len(), 2);

    cache.get_or_serialize(&structured(1)).unwrap();
    assert_eq!(cache.hits(), 2, "1 should have survived the eviction");
    cache.get_or_serialize(&structured(2)).unwrap();
    assert_eq!(cache.misses(), 4, "2 should have been evicted");
  }

  #[test]
  fn ttl_expires_cached_bytes() {
    let clock = ManualClock::new();
    let cache = SerializationCache::new(8, Some(Duration::from_secs(10)), clock.clone());
    cache.get_or_serialize(&structured(1)).unwrap();
    clock.advance(Duration::from_secs(11));
    cache.get_or_serialize(&structured(1)).unwrap();
    assert_eq!(cache.misses(), 2, "stale entry must be re-serialized");
  }

  #[test]
  fn serialization_error_does_not_poison_the_cache() {
    let cache = SerializationCache::new(8, None, ManualClock::new());
    let bad = CacheValue::Array(vec![CacheValue::Float(f64::INFINITY)]);
    assert!(cache.get_or_serialize(&bad).is_err());
    // A good value still works afterwards.
    assert!(cache.get_or_serialize(&structured(1)).is_ok());
  }
}
