use crate::clock::{now_nanos, Clock};
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::events::{CacheEvent, EventDispatcher};
use crate::metrics::{CacheStats, Metrics, TierStats};
use crate::policy::EvictionPolicy;
use crate::selector::TierSelector;
use crate::serial::SerializationCache;
use crate::store::{hash_key, MetadataStore};
use crate::sync::message::{SyncMessage, SyncOp};
use crate::tier::{TierId, TierRegistry};
use crate::traits::{Cipher, KeyObfuscator};
use crate::value::CacheValue;
use crate::vclock::VectorClock;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

const MAX_KEY_LEN: usize = 1024;

/// Per-write options. The zero value means: default TTL, automatic tier
/// selection, no encryption.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
  pub ttl: Option<Duration>,
  /// Pin the entry to a specific tier. Fails with `TierUnavailable` when
  /// that tier is not registered or down.
  pub tier: Option<TierId>,
  /// Encrypt the stored bytes with the configured `Cipher`.
  pub encrypt: bool,
}

impl SetOptions {
  pub fn ttl(ttl: Duration) -> Self {
    SetOptions {
      ttl: Some(ttl),
      ..Default::default()
    }
  }

  pub fn tier(tier: &str) -> Self {
    SetOptions {
      tier: Some(TierId::from(tier)),
      ..Default::default()
    }
  }
}

/// The public façade over tiers, eviction, serialization, and metadata.
///
/// Cheap to clone; all clones share the same engine state.
#[derive(Clone)]
pub struct CacheOrchestrator {
  pub(crate) shared: Arc<EngineShared>,
}

pub(crate) struct EngineShared {
  pub(crate) registry: TierRegistry,
  pub(crate) selector: TierSelector,
  pub(crate) policy: Arc<dyn EvictionPolicy>,
  pub(crate) store: MetadataStore,
  pub(crate) serializer: SerializationCache,
  pub(crate) metrics: Metrics,
  pub(crate) events: EventDispatcher,
  pub(crate) clock: Arc<dyn Clock>,
  pub(crate) writer_id: String,
  pub(crate) capacity: u64,
  pub(crate) default_ttl: Option<Duration>,
  pub(crate) promote_on_hit: bool,
  pub(crate) cipher: Option<Arc<dyn Cipher>>,
  pub(crate) obfuscator: Option<Arc<dyn KeyObfuscator>>,
  // Per-key critical sections: the slot for a key serializes all writers
  // and readers of that key, while other keys proceed independently.
  pub(crate) key_locks: Box<[tokio::sync::Mutex<()>]>,
  key_lock_hasher: ahash::RandomState,
  // Set when a SyncCoordinator attaches. Local mutations are mirrored here.
  pub(crate) mutation_tx: Mutex<Option<UnboundedSender<SyncMessage>>>,
  pub(crate) janitor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Drop for EngineShared {
  fn drop(&mut self) {
    if let Some(handle) = self.janitor.lock().take() {
      handle.abort();
    }
  }
}

impl EngineShared {
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    registry: TierRegistry,
    selector: TierSelector,
    policy: Arc<dyn EvictionPolicy>,
    store: MetadataStore,
    serializer: SerializationCache,
    events: EventDispatcher,
    clock: Arc<dyn Clock>,
    writer_id: String,
    capacity: u64,
    default_ttl: Option<Duration>,
    promote_on_hit: bool,
    cipher: Option<Arc<dyn Cipher>>,
    obfuscator: Option<Arc<dyn KeyObfuscator>>,
  ) -> Self {
    let num_locks = store.num_shards();
    let key_locks = (0..num_locks)
      .map(|_| tokio::sync::Mutex::new(()))
      .collect::<Vec<_>>()
      .into_boxed_slice();

    Self {
      registry,
      selector,
      policy,
      store,
      serializer,
      metrics: Metrics::default(),
      events,
      clock,
      writer_id,
      capacity,
      default_ttl,
      promote_on_hit,
      cipher,
      obfuscator,
      key_locks,
      key_lock_hasher: ahash::RandomState::new(),
      mutation_tx: Mutex::new(None),
      janitor: Mutex::new(None),
    }
  }

  fn key_slot(&self, key: &str) -> usize {
    hash_key(&self.key_lock_hasher, key) as usize % self.key_locks.len()
  }

  fn key_lock(&self, key: &str) -> &tokio::sync::Mutex<()> {
    &self.key_locks[self.key_slot(key)]
  }

  fn storage_key(&self, key: &str) -> String {
    match &self.obfuscator {
      Some(obfuscator) => obfuscator.obfuscate(key),
      None => key.to_string(),
    }
  }

  fn emit_mutation(&self, message: SyncMessage) {
    if let Some(tx) = self.mutation_tx.lock().as_ref() {
      let _ = tx.send(message);
    }
  }

  pub(crate) fn attach_mutation_sender(&self, tx: UnboundedSender<SyncMessage>) {
    *self.mutation_tx.lock() = Some(tx);
  }
}

fn validate_key(key: &str) -> Result<(), CacheError> {
  if key.is_empty() {
    return Err(CacheError::Validation("key cannot be empty".into()));
  }
  if key.len() > MAX_KEY_LEN {
    return Err(CacheError::Validation(format!(
      "key exceeds {} bytes",
      MAX_KEY_LEN
    )));
  }
  if key.chars().any(|c| c.is_control()) {
    return Err(CacheError::Validation(
      "key contains control characters".into(),
    ));
  }
  Ok(())
}

impl CacheOrchestrator {
  /// Writes `value` under `key`. On success a subsequent `get` for the same
  /// key (absent concurrent mutation) returns this value. On backend
  /// failure no metadata is recorded.
  pub async fn set(&self, key: &str, value: CacheValue, options: SetOptions) -> Result<(), CacheError> {
    validate_key(key)?;
    let shared = &self.shared;
    let ttl = options.ttl.or(shared.default_ttl);

    // Serialization and selection are pure; do them before anything sticks.
    let bytes = shared.serializer.get_or_serialize(&value)?;
    let decision = shared.selector.select(
      key,
      bytes.len(),
      value.kind(),
      ttl,
      options.tier.as_ref(),
      &shared.registry,
    )?;

    let stored: Vec<u8> = if options.encrypt {
      let cipher = shared.cipher.as_ref().ok_or_else(|| {
        CacheError::Validation("encryption requested but no cipher configured".into())
      })?;
      cipher.encrypt(&bytes)
    } else {
      bytes.to_vec()
    };

    let slot = shared.key_slot(key);
    let _guard = shared.key_locks[slot].lock().await;
    let existing = shared.store.get(key);

    if existing.is_none() {
      self.evict_for_capacity(Some(slot)).await;
    }

    let tier = shared
      .registry
      .by_id(&decision.tier)
      .ok_or(CacheError::NoBackendAvailable)?;
    let storage_key = shared.storage_key(key);

    let started = Instant::now();
    tier.backend.put(&storage_key, &stored, ttl).await?;
    tier.observe_latency(started.elapsed().as_nanos() as u64);

    let now = now_nanos(&*shared.clock);
    let wall = shared.clock.wall_nanos();
    let expires_at = ttl.map(|t| now + t.as_nanos() as u64);

    let entry = match &existing {
      Some(old) => {
        // A tier change is a move, not a copy: drop the old tier's bytes.
        if old.tier != decision.tier {
          if let Some(old_tier) = shared.registry.by_id(&old.tier) {
            if let Err(err) = old_tier.backend.delete(&storage_key).await {
              warn!(key, tier = %old.tier, %err, "failed to delete moved entry");
            }
          }
        }
        let mut vclock = old.vclock.clone();
        vclock.increment(&shared.writer_id);
        shared.metrics.updates.fetch_add(1, Ordering::Relaxed);
        CacheEntry {
          created_at: old.created_at,
          updated_at: wall,
          expires_at,
          last_accessed: AtomicU64::new(old.last_accessed.load(Ordering::Relaxed)),
          access_count: AtomicU64::new(old.access_count.load(Ordering::Relaxed)),
          tier: decision.tier.clone(),
          encrypted: options.encrypt,
          size: bytes.len() as u64,
          version: old.version + 1,
          vclock,
        }
      }
      None => {
        let mut vclock = VectorClock::new();
        vclock.increment(&shared.writer_id);
        shared.metrics.inserts.fetch_add(1, Ordering::Relaxed);
        CacheEntry {
          created_at: now,
          updated_at: wall,
          expires_at,
          last_accessed: AtomicU64::new(0),
          access_count: AtomicU64::new(0),
          tier: decision.tier.clone(),
          encrypted: options.encrypt,
          size: bytes.len() as u64,
          version: 1,
          vclock,
        }
      }
    };

    let version = entry.version;
    let vclock = entry.vclock.clone();
    shared.store.insert(key, Arc::new(entry));
    shared.policy.on_add(key, ttl);

    shared.events.emit(CacheEvent::Set {
      key: key.to_string(),
      tier: decision.tier.clone(),
      timestamp: now,
    });
    shared.emit_mutation(SyncMessage {
      key: key.to_string(),
      op: SyncOp::Set,
      payload: Some(bytes.to_vec()),
      version,
      vclock,
      origin: shared.writer_id.clone(),
      timestamp: wall,
    });
    Ok(())
  }

  /// Reads `key`. Expired entries are removed lazily and reported as
  /// absent; "not found" is a normal `None`, never an error.
  pub async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
    validate_key(key)?;
    let shared = &self.shared;
    let _guard = shared.key_lock(key).lock().await;

    let now = now_nanos(&*shared.clock);
    let meta = match shared.store.get(key) {
      Some(meta) => meta,
      None => {
        shared.metrics.misses.fetch_add(1, Ordering::Relaxed);
        shared.policy.record_outcome(false);
        return Ok(None);
      }
    };

    if meta.is_expired(now) {
      self.discard_expired(key, &meta, now).await;
      shared.metrics.misses.fetch_add(1, Ordering::Relaxed);
      shared.policy.record_outcome(false);
      return Ok(None);
    }

    let storage_key = shared.storage_key(key);
    let (bytes, serving_tier) = match self.fetch_bytes(&storage_key, &meta).await? {
      Some(found) => found,
      None => {
        // Metadata without bytes: the backend lost the entry underneath us.
        shared.store.remove(key);
        shared.policy.on_remove(key);
        if let Some(tier) = shared.registry.by_id(&meta.tier) {
          tier.misses.fetch_add(1, Ordering::Relaxed);
        }
        shared.metrics.misses.fetch_add(1, Ordering::Relaxed);
        shared.policy.record_outcome(false);
        return Ok(None);
      }
    };

    let plain = if meta.encrypted {
      let cipher = shared.cipher.as_ref().ok_or_else(|| {
        CacheError::Validation("entry is encrypted but no cipher configured".into())
      })?;
      cipher.decrypt(&bytes)?
    } else {
      bytes
    };
    let value = CacheValue::from_wire_bytes(&plain)?;

    meta.touch(now);
    shared.policy.on_access(key);
    shared.policy.record_outcome(true);
    shared.metrics.hits.fetch_add(1, Ordering::Relaxed);
    if let Some(tier) = shared.registry.by_id(&serving_tier) {
      tier.hits.fetch_add(1, Ordering::Relaxed);
    }

    if shared.promote_on_hit {
      self.promote(key, &storage_key, &meta, &plain).await;
    }

    shared.events.emit(CacheEvent::Get {
      key: key.to_string(),
      tier: serving_tier,
      timestamp: now,
    });
    Ok(Some(value))
  }

  /// Removes `key`. Idempotent: removing an absent key succeeds.
  pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
    validate_key(key)?;
    let shared = &self.shared;
    let _guard = shared.key_lock(key).lock().await;

    let meta = match shared.store.remove(key) {
      Some(meta) => meta,
      None => return Ok(()),
    };
    shared.policy.on_remove(key);

    let storage_key = shared.storage_key(key);
    if let Some(tier) = shared.registry.by_id(&meta.tier) {
      if let Err(err) = tier.backend.delete(&storage_key).await {
        warn!(key, tier = %meta.tier, %err, "backend delete failed during remove");
      }
    }

    let now = now_nanos(&*shared.clock);
    shared.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
    shared.events.emit(CacheEvent::Remove {
      key: key.to_string(),
      tier: Some(meta.tier.clone()),
      timestamp: now,
    });

    let mut vclock = meta.vclock.clone();
    vclock.increment(&shared.writer_id);
    shared.emit_mutation(SyncMessage {
      key: key.to_string(),
      op: SyncOp::Remove,
      payload: None,
      version: meta.version + 1,
      vclock,
      origin: shared.writer_id.clone(),
      timestamp: shared.clock.wall_nanos(),
    });
    Ok(())
  }

  /// Drops every entry from every tier.
  pub async fn clear(&self) -> Result<(), CacheError> {
    self.clear_inner(true).await
  }

  pub(crate) async fn clear_inner(&self, publish: bool) -> Result<(), CacheError> {
    let shared = &self.shared;
    for tier in shared.registry.iter() {
      if let Err(err) = tier.backend.clear().await {
        warn!(tier = %tier.id, %err, "backend clear failed");
      }
    }
    shared.store.clear();
    shared.policy.clear();

    let now = now_nanos(&*shared.clock);
    shared.events.emit(CacheEvent::Clear { timestamp: now });
    if publish {
      let mut vclock = VectorClock::new();
      vclock.increment(&shared.writer_id);
      shared.emit_mutation(SyncMessage {
        key: String::new(),
        op: SyncOp::Clear,
        payload: None,
        version: 0,
        vclock,
        origin: shared.writer_id.clone(),
        timestamp: shared.clock.wall_nanos(),
      });
    }
    Ok(())
  }

  /// Whether `key` is present and unexpired. Does not count as an access.
  pub fn has(&self, key: &str) -> bool {
    let now = now_nanos(&*self.shared.clock);
    match self.shared.store.get(key) {
      Some(meta) => !meta.is_expired(now),
      None => false,
    }
  }

  /// All unexpired keys, in no particular order.
  pub fn keys(&self) -> Vec<String> {
    let now = now_nanos(&*self.shared.clock);
    let mut keys = Vec::new();
    self.shared.store.for_each(|key, entry| {
      if !entry.is_expired(now) {
        keys.push(key.to_string());
      }
    });
    keys
  }

  /// Proactively sweeps every tracked key for TTL expiry. Not required for
  /// `get` correctness (expiry is lazy); the janitor calls this on a timer.
  pub async fn cleanup(&self) -> usize {
    let shared = &self.shared;
    let mut swept = 0;
    for key in shared.store.keys() {
      let _guard = shared.key_lock(&key).lock().await;
      let now = now_nanos(&*shared.clock);
      if let Some(meta) = shared.store.get(&key) {
        if meta.is_expired(now) {
          self.discard_expired(&key, &meta, now).await;
          swept += 1;
        }
      }
    }
    swept
  }

  /// Batch write. Entries are grouped by resolved tier and written with one
  /// backend batch call per tier; failures are reported per key and never
  /// block the valid keys.
  pub async fn mset(
    &self,
    items: Vec<(String, CacheValue)>,
    options: SetOptions,
  ) -> Vec<(String, Result<(), CacheError>)> {
    let shared = &self.shared;
    let ttl = options.ttl.or(shared.default_ttl);

    struct Plan {
      key: String,
      /// Wire bytes, as mirrored to peers.
      bytes: Arc<[u8]>,
      /// Bytes as handed to the backend (encrypted when requested).
      stored: Vec<u8>,
      tier: TierId,
    }

    let mut results: Vec<(String, Result<(), CacheError>)> = Vec::with_capacity(items.len());
    let mut plans: Vec<Plan> = Vec::new();

    for (key, value) in items {
      let planned = validate_key(&key)
        .and_then(|_| shared.serializer.get_or_serialize(&value))
        .and_then(|bytes| {
          let stored = if options.encrypt {
            let cipher = shared.cipher.as_ref().ok_or_else(|| {
              CacheError::Validation("encryption requested but no cipher configured".into())
            })?;
            cipher.encrypt(&bytes)
          } else {
            bytes.to_vec()
          };
          Ok((bytes, stored))
        })
        .and_then(|(bytes, stored)| {
          shared
            .selector
            .select(
              &key,
              bytes.len(),
              value.kind(),
              ttl,
              options.tier.as_ref(),
              &shared.registry,
            )
            .map(|decision| (bytes, stored, decision.tier))
        });
      match planned {
        Ok((bytes, stored, tier)) => plans.push(Plan {
          key,
          bytes,
          stored,
          tier,
        }),
        Err(err) => results.push((key, Err(err))),
      }
    }

    // One backend batch call per resolved tier.
    let mut by_tier: HashMap<TierId, Vec<usize>> = HashMap::new();
    for (index, plan) in plans.iter().enumerate() {
      by_tier.entry(plan.tier.clone()).or_default().push(index);
    }

    for (tier_id, indexes) in by_tier {
      let tier = match shared.registry.by_id(&tier_id) {
        Some(tier) => tier,
        None => continue,
      };
      let batch: Vec<(String, Vec<u8>, Option<Duration>)> = indexes
        .iter()
        .map(|&i| (shared.storage_key(&plans[i].key), plans[i].stored.clone(), ttl))
        .collect();
      let outcomes = tier.backend.put_many(&batch).await;

      for (&index, outcome) in indexes.iter().zip(outcomes) {
        let plan = &plans[index];
        match outcome {
          Ok(()) => {
            self
              .record_batch_write(&plan.key, &plan.bytes, &tier_id, ttl, options.encrypt)
              .await;
            results.push((plan.key.clone(), Ok(())));
          }
          Err(err) => results.push((plan.key.clone(), Err(err))),
        }
      }
    }

    self.evict_for_capacity(None).await;
    results
  }

  /// Batch read, grouped by owning tier. Absent and expired keys yield
  /// `Ok(None)`; backend failures are reported per key.
  pub async fn mget(&self, keys: &[String]) -> Vec<(String, Result<Option<CacheValue>, CacheError>)> {
    let shared = &self.shared;
    let now = now_nanos(&*shared.clock);

    let mut results: HashMap<String, Result<Option<CacheValue>, CacheError>> = HashMap::new();
    let mut by_tier: HashMap<TierId, Vec<String>> = HashMap::new();

    for key in keys {
      if results.contains_key(key) {
        continue;
      }
      if let Err(err) = validate_key(key) {
        results.insert(key.clone(), Err(err));
        continue;
      }
      match shared.store.get(key) {
        Some(meta) if !meta.is_expired(now) => {
          by_tier.entry(meta.tier.clone()).or_default().push(key.clone());
        }
        Some(meta) => {
          let _guard = shared.key_lock(key).lock().await;
          self.discard_expired(key, &meta, now).await;
          shared.metrics.misses.fetch_add(1, Ordering::Relaxed);
          results.insert(key.clone(), Ok(None));
        }
        None => {
          shared.metrics.misses.fetch_add(1, Ordering::Relaxed);
          results.insert(key.clone(), Ok(None));
        }
      }
    }

    for (tier_id, tier_keys) in by_tier {
      let tier = match shared.registry.by_id(&tier_id) {
        Some(tier) => tier,
        None => continue,
      };
      let storage_keys: Vec<String> = tier_keys.iter().map(|k| shared.storage_key(k)).collect();
      let outcomes = tier.backend.get_many(&storage_keys).await;

      for (key, outcome) in tier_keys.into_iter().zip(outcomes) {
        let result = match outcome {
          Ok(Some(bytes)) => self.decode_fetched(&key, bytes, now).map(Some),
          Ok(None) => {
            shared.metrics.misses.fetch_add(1, Ordering::Relaxed);
            Ok(None)
          }
          Err(err) => Err(err),
        };
        match &result {
          Ok(Some(_)) => {
            shared.metrics.hits.fetch_add(1, Ordering::Relaxed);
            tier.hits.fetch_add(1, Ordering::Relaxed);
          }
          Ok(None) => {
            tier.misses.fetch_add(1, Ordering::Relaxed);
          }
          Err(_) => {}
        }
        results.insert(key, result);
      }
    }

    keys
      .iter()
      .map(|key| {
        let result = results
          .remove(key)
          .unwrap_or(Ok(None));
        (key.clone(), result)
      })
      .collect()
  }

  /// Batch remove, grouped by owning tier. Absent keys succeed.
  pub async fn mremove(&self, keys: &[String]) -> Vec<(String, Result<(), CacheError>)> {
    let shared = &self.shared;
    let mut results: Vec<(String, Result<(), CacheError>)> = Vec::with_capacity(keys.len());
    let mut by_tier: HashMap<TierId, Vec<String>> = HashMap::new();

    for key in keys {
      if let Err(err) = validate_key(key) {
        results.push((key.clone(), Err(err)));
        continue;
      }
      match shared.store.get(key) {
        Some(meta) => by_tier.entry(meta.tier.clone()).or_default().push(key.clone()),
        None => results.push((key.clone(), Ok(()))),
      }
    }

    for (tier_id, tier_keys) in by_tier {
      let tier = match shared.registry.by_id(&tier_id) {
        Some(tier) => tier,
        None => continue,
      };
      let storage_keys: Vec<String> = tier_keys.iter().map(|k| shared.storage_key(k)).collect();
      let outcomes = tier.backend.delete_many(&storage_keys).await;

      for (key, outcome) in tier_keys.into_iter().zip(outcomes) {
        match outcome {
          Ok(()) => {
            let _guard = shared.key_lock(&key).lock().await;
            if let Some(meta) = shared.store.remove(&key) {
              shared.policy.on_remove(&key);
              shared.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
              let now = now_nanos(&*shared.clock);
              shared.events.emit(CacheEvent::Remove {
                key: key.clone(),
                tier: Some(meta.tier.clone()),
                timestamp: now,
              });
              let mut vclock = meta.vclock.clone();
              vclock.increment(&shared.writer_id);
              shared.emit_mutation(SyncMessage {
                key: key.clone(),
                op: SyncOp::Remove,
                payload: None,
                version: meta.version + 1,
                vclock,
                origin: shared.writer_id.clone(),
                timestamp: shared.clock.wall_nanos(),
              });
            }
            results.push((key, Ok(())));
          }
          Err(err) => results.push((key, Err(err))),
        }
      }
    }

    results
  }

  /// Returns the cached value for `key`, or runs `compute` (bounded by
  /// `timeout`) and caches its result. A timed-out compute is abandoned and
  /// its result, if any, discarded.
  pub async fn get_or_compute<F>(
    &self,
    key: &str,
    options: SetOptions,
    timeout: Duration,
    compute: F,
  ) -> Result<CacheValue, CacheError>
  where
    F: Future<Output = CacheValue> + Send,
  {
    if let Some(value) = self.get(key).await? {
      return Ok(value);
    }
    let value = tokio::time::timeout(timeout, compute)
      .await
      .map_err(|_| CacheError::Timeout)?;
    self.set(key, value.clone(), options).await?;
    Ok(value)
  }

  /// Point-in-time stats: per-tier hit/miss/usage plus the overall hit rate.
  pub fn get_stats(&self) -> CacheStats {
    let shared = &self.shared;
    let now = now_nanos(&*shared.clock);

    let mut counts: HashMap<TierId, (u64, u64)> = HashMap::new();
    shared.store.for_each(|_, entry| {
      if !entry.is_expired(now) {
        let slot = counts.entry(entry.tier.clone()).or_insert((0, 0));
        slot.0 += 1;
        slot.1 += entry.size;
      }
    });

    let per_tier = shared
      .registry
      .iter()
      .map(|tier| {
        let (item_count, bytes_used) = counts.get(&tier.id).copied().unwrap_or((0, 0));
        TierStats {
          tier: tier.id.clone(),
          hits: tier.hits.load(Ordering::Relaxed),
          misses: tier.misses.load(Ordering::Relaxed),
          item_count,
          bytes_used,
        }
      })
      .collect();

    shared.metrics.snapshot(per_tier)
  }

  /// Serialization-cache counters, exposed for observability.
  pub fn serializer_stats(&self) -> (u64, u64) {
    (self.shared.serializer.hits(), self.shared.serializer.misses())
  }

  /// The metadata currently held for `key`, expired or not. Intended for
  /// diagnostics; values come from [`get`](Self::get).
  pub fn metadata(&self, key: &str) -> Option<Arc<CacheEntry>> {
    self.shared.store.get(key)
  }

  // ---- internal helpers ----

  /// Evicts advisory victims until the entry count is under capacity.
  /// Candidates are re-validated against the store; a stale candidate is
  /// dropped from the policy and the policy queried again. `held_slot` is
  /// the key-lock slot the caller already holds, if any.
  async fn evict_for_capacity(&self, held_slot: Option<usize>) {
    let shared = &self.shared;
    if shared.capacity == u64::MAX {
      return;
    }
    while (shared.store.len() as u64) >= shared.capacity {
      let victim = match shared.policy.victim() {
        Some(victim) => victim,
        None => break,
      };
      // Eviction must not race a writer inside the victim's critical
      // section. A busy slot means the victim is mid-operation; stop this
      // cycle rather than wait, since two writers evicting each other's
      // held keys would deadlock.
      let slot = shared.key_slot(&victim);
      let _victim_guard = if held_slot == Some(slot) {
        None
      } else {
        match shared.key_locks[slot].try_lock() {
          Ok(guard) => Some(guard),
          Err(_) => break,
        }
      };
      let meta = match shared.store.remove(&victim) {
        Some(meta) => meta,
        None => {
          // Stale candidate: the key was concurrently removed.
          shared.policy.on_remove(&victim);
          continue;
        }
      };
      shared.policy.on_remove(&victim);
      let storage_key = shared.storage_key(&victim);
      if let Some(tier) = shared.registry.by_id(&meta.tier) {
        if let Err(err) = tier.backend.delete(&storage_key).await {
          warn!(key = %victim, tier = %meta.tier, %err, "backend delete failed during eviction");
        }
      }
      shared
        .metrics
        .evicted_by_capacity
        .fetch_add(1, Ordering::Relaxed);
      let now = now_nanos(&*shared.clock);
      shared.events.emit(CacheEvent::Remove {
        key: victim,
        tier: Some(meta.tier.clone()),
        timestamp: now,
      });
    }
  }

  /// Fetches the entry's bytes from its owning tier, probing the other
  /// tiers in priority order when the owner fails. Only the last remaining
  /// failure surfaces.
  async fn fetch_bytes(
    &self,
    storage_key: &str,
    meta: &CacheEntry,
  ) -> Result<Option<(Vec<u8>, TierId)>, CacheError> {
    let shared = &self.shared;
    let owner = shared
      .registry
      .by_id(&meta.tier)
      .ok_or(CacheError::NoBackendAvailable)?;

    let started = Instant::now();
    let owner_err = match owner.backend.get(storage_key).await {
      Ok(Some(bytes)) => {
        owner.observe_latency(started.elapsed().as_nanos() as u64);
        return Ok(Some((bytes, meta.tier.clone())));
      }
      Ok(None) => return Ok(None),
      Err(err) => err,
    };
    owner.mark_unavailable();

    // The owner malfunctioned; a promotion copy may survive elsewhere.
    for tier in shared.registry.iter() {
      if tier.id == meta.tier {
        continue;
      }
      if let Ok(Some(bytes)) = tier.backend.get(storage_key).await {
        return Ok(Some((bytes, tier.id.clone())));
      }
    }
    Err(owner_err)
  }

  /// Decodes fetched bytes and applies the hit-side metadata updates.
  fn decode_fetched(&self, key: &str, bytes: Vec<u8>, now: u64) -> Result<CacheValue, CacheError> {
    let shared = &self.shared;
    let meta = shared.store.get(key);
    let plain = match meta.as_ref().map(|m| m.encrypted) {
      Some(true) => {
        let cipher = shared.cipher.as_ref().ok_or_else(|| {
          CacheError::Validation("entry is encrypted but no cipher configured".into())
        })?;
        cipher.decrypt(&bytes)?
      }
      _ => bytes,
    };
    let value = CacheValue::from_wire_bytes(&plain)?;
    if let Some(meta) = meta {
      meta.touch(now);
      shared.policy.on_access(key);
      shared.policy.record_outcome(true);
    }
    Ok(value)
  }

  /// Read-through promotion: moves a hit on a non-primary tier into the
  /// fastest available tier. Implemented as an atomic move under the key
  /// lock, so the key still has exactly one authoritative entry.
  async fn promote(&self, key: &str, storage_key: &str, meta: &CacheEntry, plain: &[u8]) {
    let shared = &self.shared;
    let Some(current_index) = shared.registry.index_of(&meta.tier) else {
      return;
    };
    if current_index == 0 {
      return;
    }
    let Some(target) = shared.registry.by_index(0).filter(|t| t.is_available()) else {
      return;
    };

    let remaining_ttl = meta.expires_at.map(|at| {
      let now = now_nanos(&*shared.clock);
      Duration::from_nanos(at.saturating_sub(now))
    });
    let stored: Vec<u8> = if meta.encrypted {
      match shared.cipher.as_ref() {
        Some(cipher) => cipher.encrypt(plain),
        None => return,
      }
    } else {
      plain.to_vec()
    };
    if target.backend.put(storage_key, &stored, remaining_ttl).await.is_err() {
      return;
    }
    if let Some(old_tier) = shared.registry.by_id(&meta.tier) {
      let _ = old_tier.backend.delete(storage_key).await;
    }
    // Version and vector clock are untouched: promotion is placement, not
    // a write.
    let promoted = meta.clone_with_tier(target.id.clone());
    shared.store.insert(key, Arc::new(promoted));
  }

  async fn discard_expired(&self, key: &str, meta: &CacheEntry, now: u64) {
    let shared = &self.shared;
    shared.store.remove(key);
    shared.policy.on_remove(key);
    let storage_key = shared.storage_key(key);
    if let Some(tier) = shared.registry.by_id(&meta.tier) {
      let _ = tier.backend.delete(&storage_key).await;
    }
    shared.metrics.expired.fetch_add(1, Ordering::Relaxed);
    shared.events.emit(CacheEvent::Expired {
      key: key.to_string(),
      tier: meta.tier.clone(),
      timestamp: now,
    });
  }

  /// Metadata/policy bookkeeping for one successful `mset` item. Mirrors
  /// the tail of `set` under the key's critical section.
  async fn record_batch_write(
    &self,
    key: &str,
    bytes: &Arc<[u8]>,
    tier: &TierId,
    ttl: Option<Duration>,
    encrypted: bool,
  ) {
    let shared = &self.shared;
    let _guard = shared.key_lock(key).lock().await;
    let now = now_nanos(&*shared.clock);
    let wall = shared.clock.wall_nanos();
    let expires_at = ttl.map(|t| now + t.as_nanos() as u64);
    let existing = shared.store.get(key);

    let entry = match &existing {
      Some(old) => {
        let mut vclock = old.vclock.clone();
        vclock.increment(&shared.writer_id);
        shared.metrics.updates.fetch_add(1, Ordering::Relaxed);
        CacheEntry {
          created_at: old.created_at,
          updated_at: wall,
          expires_at,
          last_accessed: AtomicU64::new(old.last_accessed.load(Ordering::Relaxed)),
          access_count: AtomicU64::new(old.access_count.load(Ordering::Relaxed)),
          tier: tier.clone(),
          encrypted,
          size: bytes.len() as u64,
          version: old.version + 1,
          vclock,
        }
      }
      None => {
        let mut vclock = VectorClock::new();
        vclock.increment(&shared.writer_id);
        shared.metrics.inserts.fetch_add(1, Ordering::Relaxed);
        CacheEntry {
          created_at: now,
          updated_at: wall,
          expires_at,
          last_accessed: AtomicU64::new(0),
          access_count: AtomicU64::new(0),
          tier: tier.clone(),
          encrypted,
          size: bytes.len() as u64,
          version: 1,
          vclock,
        }
      }
    };

    let version = entry.version;
    let vclock = entry.vclock.clone();
    shared.store.insert(key, Arc::new(entry));
    shared.policy.on_add(key, ttl);
    shared.events.emit(CacheEvent::Set {
      key: key.to_string(),
      tier: tier.clone(),
      timestamp: now,
    });
    shared.emit_mutation(SyncMessage {
      key: key.to_string(),
      op: SyncOp::Set,
      payload: Some(bytes.to_vec()),
      version,
      vclock,
      origin: shared.writer_id.clone(),
      timestamp: wall,
    });
  }

  // ---- sync-layer apply path (no re-publication) ----

  pub(crate) fn entry_meta(&self, key: &str) -> Option<Arc<CacheEntry>> {
    self.shared.store.get(key)
  }

  /// Reads the current value without touching access statistics. Used by
  /// custom conflict resolvers.
  pub(crate) async fn peek(&self, key: &str) -> Option<CacheValue> {
    let shared = &self.shared;
    let meta = shared.store.get(key)?;
    if meta.is_expired(now_nanos(&*shared.clock)) {
      return None;
    }
    let storage_key = shared.storage_key(key);
    let tier = shared.registry.by_id(&meta.tier)?;
    let bytes = tier.backend.get(&storage_key).await.ok().flatten()?;
    let plain = if meta.encrypted {
      shared.cipher.as_ref()?.decrypt(&bytes).ok()?
    } else {
      bytes
    };
    CacheValue::from_wire_bytes(&plain).ok()
  }

  /// Applies a remote `Set`, merging the clocks component-wise. `timestamp`
  /// is the wall-clock write time recorded as `updated_at`. For a causally
  /// dominated apply the local writer's slot is NOT bumped (`bump_local` is
  /// false): increments belong to local writes only, otherwise an applied
  /// update would look concurrent with the origin's own next write.
  /// Conflict resolutions pass `bump_local = true` so the resolved entry
  /// strictly dominates both sides. Never re-published: the mutation
  /// channel is deliberately bypassed to avoid echo loops.
  pub(crate) async fn apply_remote_set(
    &self,
    key: &str,
    payload: &[u8],
    remote_version: u64,
    remote_clock: &VectorClock,
    timestamp: u64,
    bump_local: bool,
  ) -> Result<(), CacheError> {
    let shared = &self.shared;
    let _guard = shared.key_lock(key).lock().await;

    let decision = shared.selector.select(
      key,
      payload.len(),
      CacheValue::from_wire_bytes(payload)?.kind(),
      None,
      None,
      &shared.registry,
    )?;
    let tier = shared
      .registry
      .by_id(&decision.tier)
      .ok_or(CacheError::NoBackendAvailable)?;
    let storage_key = shared.storage_key(key);
    tier.backend.put(&storage_key, payload, None).await?;

    let now = now_nanos(&*shared.clock);
    let existing = shared.store.get(key);
    let mut vclock = existing
      .as_ref()
      .map(|old| old.vclock.clone())
      .unwrap_or_default();
    vclock.merge(remote_clock);
    if bump_local {
      vclock.increment(&shared.writer_id);
    }

    let entry = CacheEntry {
      created_at: existing.as_ref().map(|old| old.created_at).unwrap_or(now),
      updated_at: timestamp,
      expires_at: existing.as_ref().and_then(|old| old.expires_at),
      last_accessed: AtomicU64::new(0),
      access_count: AtomicU64::new(0),
      tier: decision.tier.clone(),
      encrypted: false,
      size: payload.len() as u64,
      version: existing
        .as_ref()
        .map(|old| old.version)
        .unwrap_or(0)
        .max(remote_version)
        + 1,
      vclock,
    };

    // A tier change is still a move on the remote path.
    if let Some(old) = &existing {
      if old.tier != decision.tier {
        if let Some(old_tier) = shared.registry.by_id(&old.tier) {
          let _ = old_tier.backend.delete(&storage_key).await;
        }
      }
    }

    shared.store.insert(key, Arc::new(entry));
    shared.policy.on_add(key, None);
    shared.metrics.sync_applied.fetch_add(1, Ordering::Relaxed);
    shared.events.emit(CacheEvent::Set {
      key: key.to_string(),
      tier: decision.tier,
      timestamp: now,
    });
    Ok(())
  }

  /// Applies a remote `Remove` without re-publishing.
  pub(crate) async fn apply_remote_remove(&self, key: &str) -> Result<(), CacheError> {
    let shared = &self.shared;
    let _guard = shared.key_lock(key).lock().await;
    let meta = match shared.store.remove(key) {
      Some(meta) => meta,
      None => return Ok(()),
    };
    shared.policy.on_remove(key);
    let storage_key = shared.storage_key(key);
    if let Some(tier) = shared.registry.by_id(&meta.tier) {
      let _ = tier.backend.delete(&storage_key).await;
    }
    shared.metrics.sync_applied.fetch_add(1, Ordering::Relaxed);
    shared.events.emit(CacheEvent::Remove {
      key: key.to_string(),
      tier: Some(meta.tier.clone()),
      timestamp: now_nanos(&*shared.clock),
    });
    Ok(())
  }

  /// Keeps the local value of a conflict but absorbs the remote clock. The
  /// merged clock gets the local writer's own increment on top, so the
  /// resolved entry strictly dominates both sides and the same pair of
  /// writes cannot conflict twice.
  pub(crate) async fn absorb_remote_clock(&self, key: &str, remote_clock: &VectorClock) {
    let shared = &self.shared;
    let _guard = shared.key_lock(key).lock().await;
    if let Some(old) = shared.store.get(key) {
      let mut merged = old.clone_with_tier(old.tier.clone());
      merged.vclock.merge(remote_clock);
      merged.vclock.increment(&shared.writer_id);
      shared.store.insert(key, Arc::new(merged));
    }
  }
}
