use super::EvictionPolicy;

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Evicts a uniformly random tracked key.
///
/// Keys live in a vec with a position index so removal is swap-remove O(1).
#[derive(Debug)]
pub struct RandomPolicy {
  state: Mutex<RandomState>,
}

#[derive(Debug, Default)]
struct RandomState {
  keys: Vec<String>,
  positions: HashMap<String, usize>,
}

impl RandomPolicy {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(RandomState::default()),
    }
  }
}

impl Default for RandomPolicy {
  fn default() -> Self {
    Self::new()
  }
}

impl EvictionPolicy for RandomPolicy {
  fn on_access(&self, _key: &str) {}

  fn on_add(&self, key: &str, _ttl: Option<Duration>) {
    let mut state = self.state.lock();
    if state.positions.contains_key(key) {
      return;
    }
    let pos = state.keys.len();
    state.keys.push(key.to_string());
    state.positions.insert(key.to_string(), pos);
  }

  fn victim(&self) -> Option<String> {
    let state = self.state.lock();
    if state.keys.is_empty() {
      return None;
    }
    let index = rand::rng().random_range(0..state.keys.len());
    Some(state.keys[index].clone())
  }

  fn on_remove(&self, key: &str) {
    let mut state = self.state.lock();
    if let Some(pos) = state.positions.remove(key) {
      state.keys.swap_remove(pos);
      if pos < state.keys.len() {
        let moved = state.keys[pos].clone();
        state.positions.insert(moved, pos);
      }
    }
  }

  fn clear(&self) {
    let mut state = self.state.lock();
    state.keys.clear();
    state.positions.clear();
  }

  fn len(&self) -> usize {
    self.state.lock().keys.len()
  }
}
