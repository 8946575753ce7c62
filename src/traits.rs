use crate::error::CacheError;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;

/// A storage tier the engine can place entries on. Implemented by
/// collaborators (in-memory maps, on-disk stores, networked stores); the
/// engine only consumes this capability.
#[async_trait]
pub trait StorageBackend: Send + Sync {
  async fn put(&self, key: &str, bytes: &[u8], ttl: Option<Duration>) -> Result<(), CacheError>;

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

  async fn delete(&self, key: &str) -> Result<(), CacheError>;

  async fn list_keys(&self) -> Result<Vec<String>, CacheError>;

  async fn clear(&self) -> Result<(), CacheError>;

  /// Bytes currently used by this backend.
  fn size_used(&self) -> u64;

  /// Cheap liveness probe, consulted lazily when a tier was marked
  /// unavailable.
  fn is_available(&self) -> bool;

  /// Batch write. Backends with a native batch operation should override
  /// this; the default falls back to sequential per-key calls. Failure is
  /// reported per item, never for the batch as a whole.
  async fn put_many(
    &self,
    items: &[(String, Vec<u8>, Option<Duration>)],
  ) -> Vec<Result<(), CacheError>> {
    let mut results = Vec::with_capacity(items.len());
    for (key, bytes, ttl) in items {
      results.push(self.put(key, bytes, *ttl).await);
    }
    results
  }

  /// Batch read with the same per-item semantics as `put_many`.
  async fn get_many(&self, keys: &[String]) -> Vec<Result<Option<Vec<u8>>, CacheError>> {
    let mut results = Vec::with_capacity(keys.len());
    for key in keys {
      results.push(self.get(key).await);
    }
    results
  }

  /// Batch delete with the same per-item semantics as `put_many`.
  async fn delete_many(&self, keys: &[String]) -> Vec<Result<(), CacheError>> {
    let mut results = Vec::with_capacity(keys.len());
    for key in keys {
      results.push(self.delete(key).await);
    }
    results
  }
}

/// Optional transparent encryption of value bytes at rest.
pub trait Cipher: Send + Sync {
  fn encrypt(&self, bytes: &[u8]) -> Vec<u8>;
  fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, CacheError>;
}

/// Optional obfuscation of storage keys before they reach a backend.
pub trait KeyObfuscator: Send + Sync {
  fn obfuscate(&self, key: &str) -> String;
  fn deobfuscate(&self, key: &str) -> String;
}

/// The transport the sync coordinator publishes through and receives from.
/// Message blobs are opaque to the transport.
#[async_trait]
pub trait Broadcast: Send + Sync {
  async fn publish(&self, bytes: Vec<u8>) -> Result<(), CacheError>;

  /// Stream of message blobs from other writers. The coordinator consumes
  /// each blob exactly once.
  fn subscribe(&self) -> BoxStream<'static, Vec<u8>>;

  /// Whether the transport is currently connected. While offline, outgoing
  /// messages accumulate in the coordinator's bounded queue.
  fn is_online(&self) -> bool;
}
