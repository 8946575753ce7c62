use crate::clock::{Clock, SystemClock};
use crate::error::BuildError;
use crate::events::{EventDispatcher, EventListener};
use crate::orchestrator::{CacheOrchestrator, EngineShared};
use crate::policy::{EvictionPolicy, PolicyKind};
use crate::selector::{SelectorThresholds, TierSelector};
use crate::serial::SerializationCache;
use crate::store::MetadataStore;
use crate::task::janitor;
use crate::tier::{TierId, TierRegistry};
use crate::traits::{Cipher, KeyObfuscator, StorageBackend};

use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SERIAL_CAPACITY: usize = 1024;

/// Configures and constructs a [`CacheOrchestrator`].
///
/// Tiers are registered in priority order: index 0 is the fastest. The
/// builder validates on `build()`, never on the setters.
pub struct CacheBuilder {
  writer_id: String,
  capacity: u64,
  shards: usize,
  default_ttl: Option<Duration>,
  tiers: Vec<(TierId, Arc<dyn StorageBackend>)>,
  default_tier: Option<TierId>,
  policy: PolicyKind,
  custom_policy: Option<Arc<dyn EvictionPolicy>>,
  smart_placement: bool,
  thresholds: SelectorThresholds,
  serial_capacity: usize,
  serial_ttl: Option<Duration>,
  clock: Option<Arc<dyn Clock>>,
  cipher: Option<Arc<dyn Cipher>>,
  obfuscator: Option<Arc<dyn KeyObfuscator>>,
  listeners: Vec<Arc<dyn EventListener>>,
  promote_on_hit: bool,
  janitor_interval: Option<Duration>,
}

impl Default for CacheBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheBuilder {
  pub fn new() -> Self {
    Self {
      writer_id: "local".to_string(),
      capacity: u64::MAX,
      shards: (num_cpus::get() * 4).next_power_of_two(),
      default_ttl: None,
      tiers: Vec::new(),
      default_tier: None,
      policy: PolicyKind::Lru,
      custom_policy: None,
      smart_placement: false,
      thresholds: SelectorThresholds::default(),
      serial_capacity: DEFAULT_SERIAL_CAPACITY,
      serial_ttl: None,
      clock: None,
      cipher: None,
      obfuscator: None,
      listeners: Vec::new(),
      promote_on_hit: false,
      janitor_interval: None,
    }
  }

  /// Identity used for vector-clock increments. Must be unique per writer
  /// when multiple caches sync with each other.
  pub fn writer_id(mut self, id: impl Into<String>) -> Self {
    self.writer_id = id.into();
    self
  }

  /// Maximum number of entries before the eviction policy kicks in.
  /// Unbounded by default.
  pub fn capacity(mut self, capacity: u64) -> Self {
    self.capacity = capacity;
    self
  }

  /// Number of metadata shards. Defaults to `4 * num_cpus`, rounded up to a
  /// power of two.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  /// TTL applied to writes that carry none of their own.
  pub fn default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = Some(ttl);
    self
  }

  /// Registers a storage tier. Call order is priority order: the first
  /// registered tier is treated as the fastest.
  pub fn tier(mut self, name: &str, backend: Arc<dyn StorageBackend>) -> Self {
    self.tiers.push((TierId::from(name), backend));
    self
  }

  /// The tier used when smart placement is off and the caller did not pin
  /// one. Defaults to the first registered tier.
  pub fn default_tier(mut self, name: &str) -> Self {
    self.default_tier = Some(TierId::from(name));
    self
  }

  pub fn policy(mut self, policy: PolicyKind) -> Self {
    self.policy = policy;
    self
  }

  /// Replaces the built-in policies with a caller-supplied implementation.
  pub fn custom_policy(mut self, policy: Arc<dyn EvictionPolicy>) -> Self {
    self.custom_policy = Some(policy);
    self
  }

  /// Enables size/TTL/kind based tier classification for unpinned writes.
  pub fn smart_placement(mut self, enabled: bool) -> Self {
    self.smart_placement = enabled;
    self
  }

  pub fn selector_thresholds(mut self, thresholds: SelectorThresholds) -> Self {
    self.thresholds = thresholds;
    self
  }

  /// Sizes the serialization cache; `ttl` bounds how long memoized bytes
  /// stay valid.
  pub fn serial_cache(mut self, capacity: usize, ttl: Option<Duration>) -> Self {
    self.serial_capacity = capacity;
    self.serial_ttl = ttl;
    self
  }

  /// Overrides the time source. Tests inject a manual clock here.
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  pub fn cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
    self.cipher = Some(cipher);
    self
  }

  pub fn key_obfuscator(mut self, obfuscator: Arc<dyn KeyObfuscator>) -> Self {
    self.obfuscator = Some(obfuscator);
    self
  }

  pub fn event_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
    self.listeners.push(listener);
    self
  }

  /// Moves entries hit on a slower tier into the fastest available tier.
  pub fn promote_on_hit(mut self, enabled: bool) -> Self {
    self.promote_on_hit = enabled;
    self
  }

  /// Spawns a background sweep for expired entries at this interval.
  /// Requires a Tokio runtime at build time.
  pub fn janitor_interval(mut self, interval: Duration) -> Self {
    self.janitor_interval = Some(interval);
    self
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.capacity == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.tiers.is_empty() {
      return Err(BuildError::NoTiers);
    }
    if self.writer_id.is_empty() {
      return Err(BuildError::EmptyWriterId);
    }
    if let Some(default_tier) = &self.default_tier {
      if !self.tiers.iter().any(|(id, _)| id == default_tier) {
        return Err(BuildError::UnknownDefaultTier(default_tier.to_string()));
      }
    }
    Ok(())
  }

  pub fn build(self) -> Result<CacheOrchestrator, BuildError> {
    self.validate()?;

    let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
    let default_tier = self
      .default_tier
      .unwrap_or_else(|| self.tiers[0].0.clone());

    let policy = self
      .custom_policy
      .unwrap_or_else(|| self.policy.instantiate(clock.clone()));

    let shared = Arc::new(EngineShared::new(
      TierRegistry::new(self.tiers),
      TierSelector::new(self.smart_placement, default_tier, self.thresholds),
      policy,
      MetadataStore::new(self.shards),
      SerializationCache::new(self.serial_capacity, self.serial_ttl, clock.clone()),
      EventDispatcher::new(self.listeners),
      clock,
      self.writer_id,
      self.capacity,
      self.default_ttl,
      self.promote_on_hit,
      self.cipher,
      self.obfuscator,
    ));

    if let Some(interval) = self.janitor_interval {
      let handle = janitor::spawn(Arc::downgrade(&shared), interval);
      *shared.janitor.lock() = Some(handle);
    }

    Ok(CacheOrchestrator { shared })
  }
}
