use super::EvictionPolicy;

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Evicts keys in insertion order. Accesses never refresh a key's position;
/// overwriting a live key keeps its position, while re-adding a key after a
/// removal enqueues it fresh at the back.
///
/// Removal is lazy: queue entries carry the sequence number they were
/// enqueued with, and an entry whose sequence no longer matches the live
/// table is a stale tombstone, skipped when it reaches the front. This keeps
/// `on_remove` O(1) amortized.
#[derive(Debug)]
pub struct FifoPolicy {
  state: Mutex<FifoState>,
}

#[derive(Debug)]
struct FifoState {
  next_seq: u64,
  queue: VecDeque<(u64, String)>,
  live: HashMap<String, u64>,
}

impl FifoPolicy {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(FifoState {
        next_seq: 0,
        queue: VecDeque::new(),
        live: HashMap::new(),
      }),
    }
  }
}

impl Default for FifoPolicy {
  fn default() -> Self {
    Self::new()
  }
}

impl FifoState {
  fn is_live(&self, entry: &(u64, String)) -> bool {
    self.live.get(&entry.1) == Some(&entry.0)
  }

  // Drops tombstoned entries from the front so `victim` stays cheap.
  fn compact_front(&mut self) {
    while let Some(front) = self.queue.front() {
      if self.is_live(front) {
        break;
      }
      self.queue.pop_front();
    }
  }
}

impl EvictionPolicy for FifoPolicy {
  fn on_access(&self, _key: &str) {}

  fn on_add(&self, key: &str, _ttl: Option<Duration>) {
    let mut state = self.state.lock();
    if state.live.contains_key(key) {
      // Overwrite of a live key: insertion order is unchanged.
      return;
    }
    let seq = state.next_seq;
    state.next_seq += 1;
    state.live.insert(key.to_string(), seq);
    state.queue.push_back((seq, key.to_string()));
  }

  fn victim(&self) -> Option<String> {
    let state = self.state.lock();
    state
      .queue
      .iter()
      .find(|entry| state.is_live(entry))
      .map(|(_, key)| key.clone())
  }

  fn on_remove(&self, key: &str) {
    let mut state = self.state.lock();
    state.live.remove(key);
    state.compact_front();
  }

  fn clear(&self) {
    let mut state = self.state.lock();
    state.queue.clear();
    state.live.clear();
  }

  fn len(&self) -> usize {
    self.state.lock().live.len()
  }
}
