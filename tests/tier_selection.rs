mod common;

use common::{build_tiered_cache, MemoryBackend};
use stratum_cache::traits::StorageBackend;
use stratum_cache::{CacheBuilder, CacheError, CacheValue, SetOptions, TierId};

use std::time::Duration;

#[tokio::test]
async fn explicit_tier_request_is_honored() {
  let (cache, fast, warm, cold) = build_tiered_cache(true);

  cache
    .set("pinned", CacheValue::from("v"), SetOptions::tier("cold"))
    .await
    .unwrap();

  assert!(!fast.contains("pinned"));
  assert!(!warm.contains("pinned"));
  assert!(cold.contains("pinned"));
  assert_eq!(cache.metadata("pinned").unwrap().tier, TierId::from("cold"));
}

#[tokio::test]
async fn unknown_explicit_tier_is_an_error() {
  let (cache, _, _, _) = build_tiered_cache(false);

  let result = cache
    .set("k", CacheValue::Null, SetOptions::tier("tape"))
    .await;
  assert!(matches!(result, Err(CacheError::TierUnavailable(_))));
}

#[tokio::test]
async fn unavailable_explicit_tier_is_an_error() {
  let (cache, fast, _, _) = build_tiered_cache(false);
  fast.set_available(false);

  let result = cache
    .set("k", CacheValue::Null, SetOptions::tier("fast"))
    .await;
  assert!(matches!(result, Err(CacheError::TierUnavailable(_))));
}

#[tokio::test]
async fn smart_placement_sends_small_hot_data_to_the_fast_tier() {
  let (cache, fast, _, _) = build_tiered_cache(true);

  cache
    .set(
      "counter",
      CacheValue::from(7i64),
      SetOptions::ttl(Duration::from_secs(30)),
    )
    .await
    .unwrap();

  assert!(fast.contains("counter"));
}

#[tokio::test]
async fn smart_placement_sends_large_untimed_blobs_to_the_cold_tier() {
  let (cache, _, _, cold) = build_tiered_cache(true);

  let blob = CacheValue::from(vec![0u8; 128 * 1024]);
  cache.set("archive", blob, SetOptions::default()).await.unwrap();

  assert!(cold.contains("archive"));
}

#[tokio::test]
async fn default_tier_used_when_smart_placement_is_off() {
  let fast = MemoryBackend::new("fast");
  let warm = MemoryBackend::new("warm");
  let cache = CacheBuilder::new()
    .tier("fast", fast.clone())
    .tier("warm", warm.clone())
    .default_tier("warm")
    .shards(4)
    .build()
    .unwrap();

  cache
    .set("k", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();
  assert!(!fast.contains("k"));
  assert!(warm.contains("k"));
}

#[tokio::test]
async fn placement_falls_back_when_the_chosen_tier_is_down() {
  let (cache, fast, warm, _) = build_tiered_cache(false);
  fast.set_available(false);

  cache
    .set("k", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();
  assert!(warm.contains("k"));
}

#[tokio::test]
async fn all_tiers_down_is_no_backend_available() {
  let (cache, fast, warm, cold) = build_tiered_cache(false);
  fast.set_available(false);
  warm.set_available(false);
  cold.set_available(false);

  let result = cache.set("k", CacheValue::Null, SetOptions::default()).await;
  assert!(matches!(result, Err(CacheError::NoBackendAvailable)));
}

#[tokio::test]
async fn read_falls_back_to_another_tier_on_backend_failure() {
  let (cache, fast, warm, _) = build_tiered_cache(false);

  cache
    .set("k", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();
  assert!(fast.contains("k"));

  // Simulate a replica surviving on the warm tier while fast malfunctions.
  warm
    .put("k", &fast_bytes(&cache, "k").await, None)
    .await
    .unwrap();
  fast.set_failing(true);

  assert_eq!(cache.get("k").await.unwrap(), Some(CacheValue::from(1i64)));
}

async fn fast_bytes(cache: &stratum_cache::CacheOrchestrator, key: &str) -> Vec<u8> {
  // Round-trip through the wire form the engine itself produced.
  let value = cache.get(key).await.unwrap().unwrap();
  value.to_wire_bytes().unwrap()
}

#[tokio::test]
async fn promotion_moves_a_hit_to_the_fastest_tier() {
  let fast = MemoryBackend::new("fast");
  let cold = MemoryBackend::new("cold");
  let cache = CacheBuilder::new()
    .tier("fast", fast.clone())
    .tier("cold", cold.clone())
    .promote_on_hit(true)
    .shards(4)
    .build()
    .unwrap();

  cache
    .set("k", CacheValue::from(9i64), SetOptions::tier("cold"))
    .await
    .unwrap();
  assert!(cold.contains("k"));

  assert_eq!(cache.get("k").await.unwrap(), Some(CacheValue::from(9i64)));

  // The hit moved the entry: one authoritative copy, now on the fast tier.
  assert!(fast.contains("k"));
  assert!(!cold.contains("k"));
  assert_eq!(cache.metadata("k").unwrap().tier, TierId::from("fast"));

  // Subsequent reads are served from the fast tier.
  assert_eq!(cache.get("k").await.unwrap(), Some(CacheValue::from(9i64)));
}

#[tokio::test]
async fn re_placement_moves_rather_than_copies() {
  let (cache, fast, _, cold) = build_tiered_cache(false);

  cache
    .set("k", CacheValue::from(1i64), SetOptions::tier("fast"))
    .await
    .unwrap();
  cache
    .set("k", CacheValue::from(2i64), SetOptions::tier("cold"))
    .await
    .unwrap();

  assert!(!fast.contains("k"));
  assert!(cold.contains("k"));
  assert_eq!(cache.get("k").await.unwrap(), Some(CacheValue::from(2i64)));
}
