mod common;

use common::build_cache;
use stratum_cache::{CacheError, CacheValue, PolicyKind, SetOptions};

#[tokio::test]
async fn mset_reports_per_key_results() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  let results = cache
    .mset(
      vec![
        ("a".to_string(), CacheValue::from(1i64)),
        ("".to_string(), CacheValue::from(2i64)),
        ("c".to_string(), CacheValue::from(f64::NAN)),
        ("d".to_string(), CacheValue::from(4i64)),
      ],
      SetOptions::default(),
    )
    .await;

  let by_key: std::collections::HashMap<_, _> = results.into_iter().collect();
  assert!(by_key["a"].is_ok());
  assert!(matches!(by_key[""], Err(CacheError::Validation(_))));
  assert!(matches!(by_key["c"], Err(CacheError::Serialization(_))));
  assert!(by_key["d"].is_ok());

  // The failures did not block the valid keys.
  assert_eq!(cache.get("a").await.unwrap(), Some(CacheValue::from(1i64)));
  assert_eq!(cache.get("d").await.unwrap(), Some(CacheValue::from(4i64)));
  assert!(!cache.has("c"));
}

#[tokio::test]
async fn mget_preserves_input_order() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  cache
    .set("a", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();
  cache
    .set("c", CacheValue::from(3i64), SetOptions::default())
    .await
    .unwrap();

  let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
  let results = cache.mget(&keys).await;

  assert_eq!(results.len(), 3);
  assert_eq!(results[0].0, "a");
  assert_eq!(results[0].1.as_ref().unwrap(), &Some(CacheValue::from(1i64)));
  assert_eq!(results[1].0, "b");
  assert_eq!(results[1].1.as_ref().unwrap(), &None);
  assert_eq!(results[2].0, "c");
  assert_eq!(results[2].1.as_ref().unwrap(), &Some(CacheValue::from(3i64)));
}

#[tokio::test]
async fn mget_counts_hits_and_misses() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  cache
    .set("a", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();

  let keys = vec!["a".to_string(), "missing".to_string()];
  cache.mget(&keys).await;

  let stats = cache.get_stats();
  assert_eq!(stats.hits, 1);
  assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn mremove_tolerates_absent_keys() {
  let (cache, backend) = build_cache(PolicyKind::Lru, u64::MAX);

  cache
    .set("a", CacheValue::from(1i64), SetOptions::default())
    .await
    .unwrap();
  cache
    .set("b", CacheValue::from(2i64), SetOptions::default())
    .await
    .unwrap();

  let keys = vec!["a".to_string(), "ghost".to_string(), "b".to_string()];
  let results = cache.mremove(&keys).await;

  assert!(results.iter().all(|(_, result)| result.is_ok()));
  assert!(!cache.has("a"));
  assert!(!cache.has("b"));
  assert_eq!(backend.entry_count(), 0);
  assert_eq!(cache.get_stats().invalidations, 2);
}

#[tokio::test]
async fn mset_then_mget_round_trips() {
  let (cache, _) = build_cache(PolicyKind::Lru, u64::MAX);

  let items: Vec<(String, CacheValue)> = (0..32)
    .map(|i| (format!("k{i}"), CacheValue::from(i as i64)))
    .collect();
  let results = cache.mset(items, SetOptions::default()).await;
  assert!(results.iter().all(|(_, result)| result.is_ok()));

  let keys: Vec<String> = (0..32).map(|i| format!("k{i}")).collect();
  for (i, (key, result)) in cache.mget(&keys).await.into_iter().enumerate() {
    assert_eq!(key, format!("k{i}"));
    assert_eq!(result.unwrap(), Some(CacheValue::from(i as i64)));
  }
}
