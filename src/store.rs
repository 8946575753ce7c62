use crate::entry::CacheEntry;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// The in-memory index from key to its current tier and metadata, partitioned
/// into independently locked shards so operations on different keys are
/// unlikely to contend.
pub(crate) struct MetadataStore {
  shards: Box<[CachePadded<RwLock<HashMap<String, Arc<CacheEntry>, ahash::RandomState>>>]>,
  hasher: ahash::RandomState,
}

impl MetadataStore {
  pub(crate) fn new(num_shards: usize) -> Self {
    let hasher = ahash::RandomState::new();
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      shards.push(CachePadded::new(RwLock::new(HashMap::with_hasher(
        hasher.clone(),
      ))));
    }
    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  #[inline]
  pub(crate) fn shard_index(&self, key: &str) -> usize {
    hash_key(&self.hasher, key) as usize % self.shards.len()
  }

  pub(crate) fn num_shards(&self) -> usize {
    self.shards.len()
  }

  pub(crate) fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
    let shard = &self.shards[self.shard_index(key)];
    shard.read().get(key).cloned()
  }

  pub(crate) fn insert(&self, key: &str, entry: Arc<CacheEntry>) -> Option<Arc<CacheEntry>> {
    let shard = &self.shards[self.shard_index(key)];
    shard.write().insert(key.to_string(), entry)
  }

  pub(crate) fn remove(&self, key: &str) -> Option<Arc<CacheEntry>> {
    let shard = &self.shards[self.shard_index(key)];
    shard.write().remove(key)
  }

  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|shard| shard.read().len()).sum()
  }

  pub(crate) fn clear(&self) {
    for shard in self.shards.iter() {
      shard.write().clear();
    }
  }

  /// Snapshot of all keys. Used by `keys()` and the cleanup sweep; shards
  /// are read-locked one at a time, never all at once.
  pub(crate) fn keys(&self) -> Vec<String> {
    let mut keys = Vec::new();
    for shard in self.shards.iter() {
      keys.extend(shard.read().keys().cloned());
    }
    keys
  }

  /// Visits every entry without cloning keys, for stats aggregation.
  pub(crate) fn for_each(&self, mut visit: impl FnMut(&str, &Arc<CacheEntry>)) {
    for shard in self.shards.iter() {
      let guard = shard.read();
      for (key, entry) in guard.iter() {
        visit(key, entry);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tier::TierId;
  use crate::vclock::VectorClock;
  use std::sync::atomic::AtomicU64;

  fn entry(tier: &str) -> Arc<CacheEntry> {
    Arc::new(CacheEntry {
      created_at: 0,
      updated_at: 0,
      expires_at: None,
      last_accessed: AtomicU64::new(0),
      access_count: AtomicU64::new(0),
      tier: TierId::from(tier),
      encrypted: false,
      size: 1,
      version: 1,
      vclock: VectorClock::new(),
    })
  }

  #[test]
  fn insert_get_remove() {
    let store = MetadataStore::new(4);
    assert!(store.insert("a", entry("fast")).is_none());
    assert!(store.get("a").is_some());
    assert_eq!(store.len(), 1);
    assert!(store.remove("a").is_some());
    assert!(store.get("a").is_none());
    assert!(store.remove("a").is_none());
  }

  #[test]
  fn keys_spans_all_shards() {
    let store = MetadataStore::new(4);
    for i in 0..32 {
      store.insert(&format!("key-{i}"), entry("fast"));
    }
    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys.len(), 32);
    assert_eq!(store.len(), 32);
  }
}
