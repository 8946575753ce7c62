use super::lru_list::LruList;
use super::EvictionPolicy;

use parking_lot::Mutex;
use std::time::Duration;

/// Evicts the least recently used key. Every access or add moves the key to
/// the head of the recency list; the victim is the tail.
#[derive(Debug)]
pub struct LruPolicy {
  list: Mutex<LruList>,
}

impl LruPolicy {
  pub fn new() -> Self {
    Self {
      list: Mutex::new(LruList::new()),
    }
  }
}

impl Default for LruPolicy {
  fn default() -> Self {
    Self::new()
  }
}

impl EvictionPolicy for LruPolicy {
  fn on_access(&self, key: &str) {
    self.list.lock().move_to_front(key);
  }

  fn on_add(&self, key: &str, _ttl: Option<Duration>) {
    self.list.lock().push_front(key);
  }

  fn victim(&self) -> Option<String> {
    self.list.lock().peek_back()
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn victim_is_least_recently_used() {
    let policy = LruPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    policy.on_add("c", None);
    assert_eq!(policy.victim().as_deref(), Some("a"));
  }

  #[test]
  fn access_refreshes_recency() {
    let policy = LruPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    policy.on_access("a");
    assert_eq!(policy.victim().as_deref(), Some("b"));
  }

  #[test]
  fn victim_does_not_mutate() {
    let policy = LruPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    assert_eq!(policy.victim().as_deref(), Some("a"));
    assert_eq!(policy.victim().as_deref(), Some("a"));
  }

  #[test]
  fn remove_then_victim_skips_key() {
    let policy = LruPolicy::new();
    policy.on_add("a", None);
    policy.on_add("b", None);
    policy.on_remove("a");
    assert_eq!(policy.victim().as_deref(), Some("b"));
    assert_eq!(policy.len(), 1);
  }
}
