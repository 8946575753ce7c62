mod common;

use common::build_cache;
use stratum_cache::{CacheError, CacheValue, PolicyKind, SetOptions};

use std::collections::BTreeMap;

fn profile(name: &str, age: i64) -> CacheValue {
  let mut map = BTreeMap::new();
  map.insert("name".to_string(), CacheValue::from(name));
  map.insert("age".to_string(), CacheValue::from(age));
  map.insert(
    "tags".to_string(),
    CacheValue::Array(vec![CacheValue::from("admin"), CacheValue::from("beta")]),
  );
  CacheValue::Map(map)
}

#[tokio::test]
async fn structured_values_round_trip() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  let value = profile("alice", 30);
  cache
    .set("user:1", value.clone(), SetOptions::default())
    .await
    .unwrap();
  assert_eq!(cache.get("user:1").await.unwrap(), Some(value));
}

#[tokio::test]
async fn repeated_writes_of_equal_values_reuse_bytes() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  // Same structural content under different keys.
  cache
    .set("user:1", profile("alice", 30), SetOptions::default())
    .await
    .unwrap();
  cache
    .set("user:1-copy", profile("alice", 30), SetOptions::default())
    .await
    .unwrap();

  let (hits, misses) = cache.serializer_stats();
  assert_eq!(misses, 1);
  assert_eq!(hits, 1);
}

#[tokio::test]
async fn changed_values_are_reserialized() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  cache
    .set("user:1", profile("alice", 30), SetOptions::default())
    .await
    .unwrap();
  cache
    .set("user:1", profile("alice", 31), SetOptions::default())
    .await
    .unwrap();

  let (_, misses) = cache.serializer_stats();
  assert_eq!(misses, 2);
  assert_eq!(
    cache.get("user:1").await.unwrap(),
    Some(profile("alice", 31))
  );
}

#[tokio::test]
async fn primitives_bypass_the_serializer_cache() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  cache
    .set("a", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();
  cache
    .set("b", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();

  let (hits, misses) = cache.serializer_stats();
  assert_eq!((hits, misses), (0, 0));
}

#[tokio::test]
async fn non_finite_floats_are_rejected() {
  let (cache, backend) = build_cache(PolicyKind::Lru, u64::MAX);

  let result = cache
    .set("nan", CacheValue::from(f64::NAN), SetOptions::default())
    .await;
  assert!(matches!(result, Err(CacheError::Serialization(_))));

  // The failed write left nothing behind.
  assert!(!cache.has("nan"));
  assert_eq!(backend.entry_count(), 0);
  assert_eq!(cache.get_stats().inserts, 0);
}

#[tokio::test]
async fn binary_values_survive_unchanged() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  let blob: Vec<u8> = (0..=255).collect();
  cache
    .set("blob", CacheValue::from(blob.clone()), SetOptions::default())
    .await
    .unwrap();
  assert_eq!(
    cache.get("blob").await.unwrap(),
    Some(CacheValue::Bytes(blob))
  );
}
