use super::lru_list::LruList;
use super::EvictionPolicy;

use parking_lot::Mutex;
use std::time::Duration;

/// Evicts the most recently used key, the inverse of LRU.
///
/// Useful for cyclic-scan workloads where the item touched last is the one
/// least likely to be needed again soon.
#[derive(Debug)]
pub struct MruPolicy {
  list: Mutex<LruList>,
}

impl MruPolicy {
  pub fn new() -> Self {
    Self {
      list: Mutex::new(LruList::new()),
    }
  }
}

impl Default for MruPolicy {
  fn default() -> Self {
    Self::new()
  }
}

impl EvictionPolicy for MruPolicy {
  fn on_access(&self, key: &str) {
    self.list.lock().move_to_front(key);
  }

  fn on_add(&self, key: &str, _ttl: Option<Duration>) {
    self.list.lock().push_front(key);
  }

  fn victim(&self) -> Option<String> {
    self.list.lock().peek_front()
  }

  fn on_remove(&self, key: &str) {
    self.list.lock().remove(key);
  }

  fn clear(&self) {
    self.list.lock().clear();
  }

  fn len(&self) -> usize {
    self.list.lock().len()
  }
}
