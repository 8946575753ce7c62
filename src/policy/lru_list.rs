use std::collections::HashMap;

use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node {
  key: String,
  next: Option<Index>,
  prev: Option<Index>,
}

// A self-contained recency list shared by the LRU and MRU policies.
// Arena-backed so moves never reallocate other nodes.
#[derive(Debug)]
pub(super) struct LruList {
  nodes: Arena<Node>,
  // O(1) lookup of a key to its node index in the arena.
  lookup: HashMap<String, Index>,
  // Head is the most-recently-used item, tail the least.
  head: Option<Index>,
  tail: Option<Index>,
}

impl LruList {
  pub fn new() -> Self {
    Self {
      nodes: Arena::new(),
      lookup: HashMap::new(),
      head: None,
      tail: None,
    }
  }

  pub fn len(&self) -> usize {
    self.lookup.len()
  }

  fn unlink(&mut self, index: Index) {
    let node = &self.nodes[index];
    let prev_idx = node.prev;
    let next_idx = node.next;

    if let Some(prev) = prev_idx {
      self.nodes[prev].next = next_idx;
    } else {
      self.head = next_idx;
    }

    if let Some(next) = next_idx {
      self.nodes[next].prev = prev_idx;
    } else {
      self.tail = prev_idx;
    }
  }

  fn push_front_node(&mut self, index: Index) {
    let old_head = self.head;
    self.nodes[index].next = old_head;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old) = old_head {
      self.nodes[old].prev = Some(index);
    }
    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  /// Inserts `key` at the front, or moves it there if already tracked.
  pub fn push_front(&mut self, key: &str) {
    if self.lookup.contains_key(key) {
      self.move_to_front(key);
      return;
    }
    let index = self.nodes.insert(Node {
      key: key.to_string(),
      next: None,
      prev: None,
    });
    self.lookup.insert(key.to_string(), index);
    self.push_front_node(index);
  }

  pub fn move_to_front(&mut self, key: &str) {
    if let Some(&index) = self.lookup.get(key) {
      if self.head != Some(index) {
        self.unlink(index);
        self.push_front_node(index);
      }
    }
  }

  /// Least-recently-used key, without mutating the list.
  pub fn peek_back(&self) -> Option<String> {
    self.tail.map(|index| self.nodes[index].key.clone())
  }

  /// Most-recently-used key, without mutating the list.
  pub fn peek_front(&self) -> Option<String> {
    self.head.map(|index| self.nodes[index].key.clone())
  }

  pub fn remove(&mut self, key: &str) -> bool {
    if let Some(index) = self.lookup.remove(key) {
      self.unlink(index);
      self.nodes.remove(index);
      true
    } else {
      false
    }
  }

  pub fn clear(&mut self) {
    self.nodes.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
  }

  // A helper for tests, to get the order of keys from head to tail.
  #[cfg(test)]
  pub(crate) fn keys_as_vec(&self) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = self.head;
    while let Some(index) = current {
      keys.push(self.nodes[index].key.clone());
      current = self.nodes[index].next;
    }
    keys
  }
}
