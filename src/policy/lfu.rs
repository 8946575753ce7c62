use super::EvictionPolicy;

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Evicts the least frequently used key; ties break toward the oldest
/// last access.
///
/// Tracks `(frequency, access-sequence)` per key in an ordered set so the
/// victim is always the first element.
#[derive(Debug)]
pub struct LfuPolicy {
  state: Mutex<LfuState>,
}

#[derive(Debug, Default)]
struct LfuState {
  // Monotonic counter standing in for a last-access timestamp.
  seq: u64,
  entries: HashMap<String, (u64, u64)>, // key -> (freq, seq)
  ordered: BTreeSet<(u64, u64, String)>, // (freq, seq, key)
}

impl LfuPolicy {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(LfuState::default()),
    }
  }
}

impl Default for LfuPolicy {
  fn default() -> Self {
    Self::new()
  }
}

impl LfuState {
  fn bump(&mut self, key: &str, freq_delta: u64) {
    if let Some((freq, seq)) = self.entries.get(key).copied() {
      self.ordered.remove(&(freq, seq, key.to_string()));
      self.seq += 1;
      let updated = (freq + freq_delta, self.seq);
      self.entries.insert(key.to_string(), updated);
      self.ordered.insert((updated.0, updated.1, key.to_string()));
    }
  }
}

impl EvictionPolicy for LfuPolicy {
  fn on_access(&self, key: &str) {
    self.state.lock().bump(key, 1);
  }

  fn on_add(&self, key: &str, _ttl: Option<Duration>) {
    let mut state = self.state.lock();
    if state.entries.contains_key(key) {
      state.bump(key, 1);
      return;
    }
    state.seq += 1;
    let entry = (1, state.seq);
    state.entries.insert(key.to_string(), entry);
    state.ordered.insert((entry.0, entry.1, key.to_string()));
  }

  fn victim(&self) -> Option<String> {
    let state = self.state.lock();
    state.ordered.iter().next().map(|(_, _, key)| key.clone())
  }

  fn on_remove(&self, key: &str) {
    let mut state = self.state.lock();
    if let Some((freq, seq)) = state.entries.remove(key) {
      state.ordered.remove(&(freq, seq, key.to_string()));
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

  #[test]
  fn victim_is_lowest_frequency() {
    let policy = LfuPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    policy.on_access("a");
    policy.on_access("a");
    policy.on_access("b");
    // a: freq 3, b: freq 2.
    assert_eq!(policy.victim().as_deref(), Some("b"));
  }

  #[test]
  fn frequency_ties_break_by_oldest_access() {
    let policy = LfuPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    // Both freq 1; a was touched longer ago.
    assert_eq!(policy.victim().as_deref(), Some("a"));

    policy.on_access("a");
    policy.on_access("b");
    // Both freq 2; a's last access is older again.
    assert_eq!(policy.victim().as_deref(), Some("a"));
  }

  #[test]
  fn remove_clears_both_indexes() {
    let policy = LfuPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    policy.on_remove("a");
    assert_eq!(policy.victim().as_deref(), Some("b"));
    policy.on_remove("b");
    assert!(policy.victim().is_none());
    assert_eq!(policy.len(), 0);
  }
}
