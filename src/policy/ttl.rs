use super::EvictionPolicy;
use crate::clock::Clock;

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

// Keys without a TTL order after every timed key, oldest insertion first.
const NO_EXPIRY: u64 = u64::MAX;

/// Evicts the key with the soonest absolute expiry.
///
/// A key whose TTL has already elapsed is by construction the first element
/// of the ordering, so eager expiry wins over recency automatically. Untimed
/// keys are only chosen once no timed key remains.
pub struct TtlPolicy {
  clock: Arc<dyn Clock>,
  state: Mutex<TtlState>,
}

#[derive(Default)]
struct TtlState {
  seq: u64,
  entries: HashMap<String, (u64, u64)>, // key -> (expires_at_nanos, seq)
  ordered: BTreeSet<(u64, u64, String)>, // (expires_at_nanos, seq, key)
}

impl TtlPolicy {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      clock,
      state: Mutex::new(TtlState::default()),
    }
  }
}

impl EvictionPolicy for TtlPolicy {
  fn on_access(&self, _key: &str) {}

  fn on_add(&self, key: &str, ttl: Option<Duration>) {
    let expires_at = match ttl {
      Some(ttl) => (self.clock.now() + ttl).as_nanos() as u64,
      None => NO_EXPIRY,
    };

    let mut state = self.state.lock();
    if let Some((old_exp, old_seq)) = state.entries.remove(key) {
      state.ordered.remove(&(old_exp, old_seq, key.to_string()));
    }
    state.seq += 1;
    let seq = state.seq;
    state.entries.insert(key.to_string(), (expires_at, seq));
    state.ordered.insert((expires_at, seq, key.to_string()));
  }

  fn victim(&self) -> Option<String> {
    let state = self.state.lock();
    state.ordered.iter().next().map(|(_, _, key)| key.clone())
  }

  fn on_remove(&self, key: &str) {
    let mut state = self.state.lock();
    if let Some((exp, seq)) = state.entries.remove(key) {
      state.ordered.remove(&(exp, seq, key.to_string()));
    }
  }

  fn clear(&self) {
    let mut state = self.state.lock();
    state.entries.clear();
    state.ordered.clear();
    state.seq = 0;
  }

  fn len(&self) -> usize {
    self.state.lock().entries.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;

  #[test]
  fn soonest_expiry_is_the_victim() {
    let clock = ManualClock::new();
    let policy = TtlPolicy::new(clock);
    policy.on_add("slow", Some(Duration::from_secs(100)));
    policy.on_add("fast", Some(Duration::from_secs(1)));
    assert_eq!(policy.victim().as_deref(), Some("fast"));
  }

  #[test]
  fn untimed_keys_lose_to_timed_ones() {
    let clock = ManualClock::new();
    let policy = TtlPolicy::new(clock);
    policy.on_add("forever", None);
    policy.on_add("timed", Some(Duration::from_secs(60)));
    assert_eq!(policy.victim().as_deref(), Some("timed"));
    policy.on_remove("timed");
    assert_eq!(policy.victim().as_deref(), Some("forever"));
  }

  #[test]
  fn elapsed_key_surfaces_first() {
    let clock = ManualClock::new();
    let policy = TtlPolicy::new(clock.clone());
    policy.on_add("a", Some(Duration::from_secs(10)));
    clock.advance(Duration::from_secs(20));
    // "a" is already expired; new longer-lived keys never outrank it.
    policy.on_add("b", Some(Duration::from_secs(10)));
    assert_eq!(policy.victim().as_deref(), Some("a"));
  }

  #[test]
  fn re_add_refreshes_expiry() {
    let clock = ManualClock::new();
    let policy = TtlPolicy::new(clock);
    policy.on_add("a", Some(Duration::from_secs(1)));
    policy.on_add("b", Some(Duration::from_secs(5)));
    policy.on_add("a", Some(Duration::from_secs(60)));
    assert_eq!(policy.victim().as_deref(), Some("b"));
    assert_eq!(policy.len(), 2);
  }
}
