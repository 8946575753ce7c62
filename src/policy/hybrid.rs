use super::lfu::LfuPolicy;
use super::lru::LruPolicy;
use super::EvictionPolicy;

use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;

const DEFAULT_WINDOW: u32 = 100;
const BIAS_STEP: f64 = 0.1;
const BIAS_FLOOR: f64 = 0.2;
const BIAS_CEILING: f64 = 0.8;
const HIGH_HIT_RATE: f64 = 0.8;
const LOW_HIT_RATE: f64 = 0.5;

/// An adaptive policy that blends LRU and LFU, self-tuning between
/// recency-biased and frequency-biased eviction.
///
/// `lfu_bias` is the probability of drawing the eviction candidate from the
/// LFU side. Every `window` lookups the hit rate over that window is
/// recomputed: a high hit rate shifts the bias toward LRU (recency is
/// working), a low one shifts it toward LFU. The step size and clamp are
/// tunable defaults, not invariants.
pub struct HybridPolicy {
  lru: LruPolicy,
  lfu: LfuPolicy,
  blend: Mutex<BlendState>,
  window: u32,
}

#[derive(Debug)]
struct BlendState {
  lfu_bias: f64,
  lookups: u32,
  hits: u32,
}

impl HybridPolicy {
  pub fn new() -> Self {
    Self::with_window(DEFAULT_WINDOW)
  }

  pub fn with_window(window: u32) -> Self {
    Self {
      lru: LruPolicy::new(),
      lfu: LfuPolicy::new(),
      blend: Mutex::new(BlendState {
        lfu_bias: 0.5,
        lookups: 0,
        hits: 0,
      }),
      window: window.max(1),
    }
  }

  /// Current blend weight, exposed for observability and tests.
  pub fn lfu_bias(&self) -> f64 {
    self.blend.lock().lfu_bias
  }
}

impl Default for HybridPolicy {
  fn default() -> Self {
    Self::new()
  }
}

impl EvictionPolicy for HybridPolicy {
  fn on_access(&self, key: &str) {
    self.lru.on_access(key);
    self.lfu.on_access(key);
  }

  fn on_add(&self, key: &str, ttl: Option<Duration>) {
    self.lru.on_add(key, ttl);
    self.lfu.on_add(key, ttl);
  }

  fn victim(&self) -> Option<String> {
    let bias = self.blend.lock().lfu_bias;
    let from_lfu = rand::rng().random::<f64>() < bias;
    // Fall back to the other sub-policy if the chosen one is empty.
    if from_lfu {
      self.lfu.victim().or_else(|| self.lru.victim())
    } else {
      self.lru.victim().or_else(|| self.lfu.victim())
    }
  }

  fn on_remove(&self, key: &str) {
    self.lru.on_remove(key);
    self.lfu.on_remove(key);
  }

  fn clear(&self) {
    self.lru.clear();
    self.lfu.clear();
    let mut blend = self.blend.lock();
    blend.lookups = 0;
    blend.hits = 0;
  }

  fn len(&self) -> usize {
    self.lru.len()
  }

  fn record_outcome(&self, hit: bool) {
    let mut blend = self.blend.lock();
    blend.lookups += 1;
    if hit {
      blend.hits += 1;
    }
    if blend.lookups < self.window {
      return;
    }

    let hit_rate = blend.hits as f64 / blend.lookups as f64;
    if hit_rate > HIGH_HIT_RATE {
      blend.lfu_bias = (blend.lfu_bias - BIAS_STEP).max(BIAS_FLOOR);
    } else if hit_rate < LOW_HIT_RATE {
      blend.lfu_bias = (blend.lfu_bias + BIAS_STEP).min(BIAS_CEILING);
    }
    blend.lookups = 0;
    blend.hits = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn drive(policy: &HybridPolicy, hits: u32, misses: u32) {
    for _ in 0..hits {
      policy.record_outcome(true);
    }
    for _ in 0..misses {
      policy.record_outcome(false);
    }
  }

  #[test]
  fn high_hit_rate_shifts_toward_lru() {
    let policy = HybridPolicy::new();
    assert_eq!(policy.lfu_bias(), 0.5);
    // 85 hits out of 100 lookups.
    drive(&policy, 85, 15);
    assert!((policy.lfu_bias() - 0.4).abs() < 1e-9);
  }

  #[test]
  fn low_hit_rate_shifts_toward_lfu() {
    let policy = HybridPolicy::new();
    drive(&policy, 30, 70);
    assert!((policy.lfu_bias() - 0.6).abs() < 1e-9);
  }

  #[test]
  fn moderate_hit_rate_leaves_bias_alone() {
    let policy = HybridPolicy::new();
    drive(&policy, 65, 35);
    assert_eq!(policy.lfu_bias(), 0.5);
  }

  #[test]
  fn bias_is_clamped() {
    let policy = HybridPolicy::new();
    for _ in 0..10 {
      drive(&policy, 100, 0);
    }
    assert!((policy.lfu_bias() - 0.2).abs() < 1e-9, "floor at 0.2");

    for _ in 0..20 {
      drive(&policy, 0, 100);
    }
    assert!((policy.lfu_bias() - 0.8).abs() < 1e-9, "ceiling at 0.8");
  }

  #[test]
  fn victim_falls_back_when_one_side_is_empty() {
    let policy = HybridPolicy::new();
    policy.on_add("a", None);
    for _ in 0..20 {
      assert_eq!(policy.victim().as_deref(), Some("a"));
    }
  }

  #[test]
  fn sub_policies_stay_in_step() {
    let policy = HybridPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    policy.on_remove("a");
    assert_eq!(policy.len(), 1);
    assert_eq!(policy.lru.len(), policy.lfu.len());
  }
}
