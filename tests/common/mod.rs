#![allow(dead_code)]

use stratum_cache::error::CacheError;
use stratum_cache::tier::TierId;
use stratum_cache::traits::{Broadcast, StorageBackend};
use stratum_cache::{CacheBuilder, CacheOrchestrator, PolicyKind};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// In-memory backend with switchable failure and availability, so tests can
/// exercise the fallback and cleanup paths.
pub struct MemoryBackend {
  name: String,
  data: Mutex<HashMap<String, Vec<u8>>>,
  available: AtomicBool,
  failing: AtomicBool,
  puts: AtomicU64,
  gets: AtomicU64,
  hold_puts: AtomicBool,
  put_gate: Notify,
}

impl MemoryBackend {
  pub fn new(name: &str) -> Arc<Self> {
    Arc::new(Self {
      name: name.to_string(),
      data: Mutex::new(HashMap::new()),
      available: AtomicBool::new(true),
      failing: AtomicBool::new(false),
      puts: AtomicU64::new(0),
      gets: AtomicU64::new(0),
      hold_puts: AtomicBool::new(false),
      put_gate: Notify::new(),
    })
  }

  /// While held, every put writes its bytes and then parks until
  /// [`release_puts`](Self::release_puts), so tests can freeze a write
  /// mid-flight.
  pub fn hold_puts(&self, hold: bool) {
    self.hold_puts.store(hold, Ordering::SeqCst);
  }

  pub fn release_puts(&self) {
    self.put_gate.notify_waiters();
  }

  pub fn set_available(&self, available: bool) {
    self.available.store(available, Ordering::SeqCst);
  }

  /// While failing, every operation returns a backend error.
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn contains(&self, key: &str) -> bool {
    self.data.lock().contains_key(key)
  }

  pub fn entry_count(&self) -> usize {
    self.data.lock().len()
  }

  pub fn puts(&self) -> u64 {
    self.puts.load(Ordering::SeqCst)
  }

  pub fn gets(&self) -> u64 {
    self.gets.load(Ordering::SeqCst)
  }

  /// Drops a key behind the engine's back.
  pub fn lose(&self, key: &str) {
    self.data.lock().remove(key);
  }

  fn check(&self) -> Result<(), CacheError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(CacheError::Backend {
        tier: TierId::from(self.name.as_str()),
        message: "injected failure".into(),
      });
    }
    Ok(())
  }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
  async fn put(&self, key: &str, bytes: &[u8], _ttl: Option<Duration>) -> Result<(), CacheError> {
    self.check()?;
    self.puts.fetch_add(1, Ordering::SeqCst);
    self.data.lock().insert(key.to_string(), bytes.to_vec());
    if self.hold_puts.load(Ordering::SeqCst) {
      self.put_gate.notified().await;
    }
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    self.check()?;
    self.gets.fetch_add(1, Ordering::SeqCst);
    Ok(self.data.lock().get(key).cloned())
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    self.check()?;
    self.data.lock().remove(key);
    Ok(())
  }

  async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
    self.check()?;
    Ok(self.data.lock().keys().cloned().collect())
  }

  async fn clear(&self) -> Result<(), CacheError> {
    self.check()?;
    self.data.lock().clear();
    Ok(())
  }

  fn size_used(&self) -> u64 {
    self.data.lock().values().map(|v| v.len() as u64).sum()
  }

  fn is_available(&self) -> bool {
    self.available.load(Ordering::SeqCst)
  }
}

/// Shared in-process hub: every transport attached to the hub sees every
/// published blob, including its own (the coordinator filters by origin).
pub struct BroadcastHub {
  tx: broadcast::Sender<Vec<u8>>,
}

impl BroadcastHub {
  pub fn new() -> Arc<Self> {
    let (tx, _) = broadcast::channel(256);
    Arc::new(Self { tx })
  }

  pub fn transport(self: &Arc<Self>) -> Arc<HubTransport> {
    Arc::new(HubTransport {
      tx: self.tx.clone(),
      online: AtomicBool::new(true),
      publish_failing: AtomicBool::new(false),
      publishes: AtomicU64::new(0),
    })
  }
}

pub struct HubTransport {
  tx: broadcast::Sender<Vec<u8>>,
  online: AtomicBool,
  publish_failing: AtomicBool,
  publishes: AtomicU64,
}

impl HubTransport {
  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  /// Flaky-link mode: the transport claims to be online but every publish
  /// fails.
  pub fn set_publish_failing(&self, failing: bool) {
    self.publish_failing.store(failing, Ordering::SeqCst);
  }

  pub fn publishes(&self) -> u64 {
    self.publishes.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Broadcast for HubTransport {
  async fn publish(&self, bytes: Vec<u8>) -> Result<(), CacheError> {
    if !self.online.load(Ordering::SeqCst) || self.publish_failing.load(Ordering::SeqCst) {
      return Err(CacheError::Backend {
        tier: TierId::from("broadcast"),
        message: "transport offline".into(),
      });
    }
    self.publishes.fetch_add(1, Ordering::SeqCst);
    let _ = self.tx.send(bytes);
    Ok(())
  }

  fn subscribe(&self) -> BoxStream<'static, Vec<u8>> {
    let rx = self.tx.subscribe();
    futures_util::stream::unfold(rx, |mut rx| async move {
      loop {
        match rx.recv().await {
          Ok(blob) => return Some((blob, rx)),
          Err(broadcast::error::RecvError::Lagged(_)) => continue,
          Err(broadcast::error::RecvError::Closed) => return None,
        }
      }
    })
    .boxed()
  }

  fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

/// One tier, the given policy and capacity.
pub fn build_cache(policy: PolicyKind, capacity: u64) -> (CacheOrchestrator, Arc<MemoryBackend>) {
  let backend = MemoryBackend::new("fast");
  let cache = CacheBuilder::new()
    .tier("fast", backend.clone())
    .policy(policy)
    .capacity(capacity)
    .shards(4)
    .build()
    .unwrap();
  (cache, backend)
}

/// Three tiers in priority order, for placement tests.
pub fn build_tiered_cache(
  smart: bool,
) -> (
  CacheOrchestrator,
  Arc<MemoryBackend>,
  Arc<MemoryBackend>,
  Arc<MemoryBackend>,
) {
  let fast = MemoryBackend::new("fast");
  let warm = MemoryBackend::new("warm");
  let cold = MemoryBackend::new("cold");
  let cache = CacheBuilder::new()
    .tier("fast", fast.clone())
    .tier("warm", warm.clone())
    .tier("cold", cold.clone())
    .smart_placement(smart)
    .shards(4)
    .build()
    .unwrap();
  (cache, fast, warm, cold)
}
