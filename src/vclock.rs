use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
  /// Both clocks are identical.
  Equal,
  /// `self` has seen everything the other clock has, and more.
  Dominates,
  /// The other clock has seen everything `self` has, and more.
  Dominated,
  /// Each clock has progress the other has not seen. A write carrying a
  /// concurrent clock is a conflict, never silently reordered.
  Concurrent,
}

/// Causal version tracking for a key across writer identities.
///
/// Each writer bumps only its own slot; merging takes the component-wise
/// maximum across all known writer ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
  counters: BTreeMap<String, u64>,
}

impl VectorClock {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bumps the counter for `writer` by one.
  pub fn increment(&mut self, writer: &str) {
    let slot = self.counters.entry(writer.to_string()).or_insert(0);
    *slot += 1;
  }

  /// Returns the counter for `writer` (0 when the writer is unknown).
  pub fn get(&self, writer: &str) -> u64 {
    self.counters.get(writer).copied().unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.counters.is_empty()
  }

  /// Component-wise maximum of both clocks, across all known writer ids.
  pub fn merge(&mut self, other: &VectorClock) {
    for (writer, &count) in &other.counters {
      let slot = self.counters.entry(writer.clone()).or_insert(0);
      if count > *slot {
        *slot = count;
      }
    }
  }

  /// Compares two clocks component-wise across the union of writer ids.
  pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
    let mut self_ahead = false;
    let mut other_ahead = false;

    for (writer, &count) in &self.counters {
      match count.cmp(&other.get(writer)) {
        std::cmp::Ordering::Greater => self_ahead = true,
        std::cmp::Ordering::Less => other_ahead = true,
        std::cmp::Ordering::Equal => {}
      }
    }
    for (writer, &count) in &other.counters {
      if count > self.get(writer) {
        other_ahead = true;
      }
    }

    match (self_ahead, other_ahead) {
      (false, false) => ClockOrdering::Equal,
      (true, false) => ClockOrdering::Dominates,
      (false, true) => ClockOrdering::Dominated,
      (true, true) => ClockOrdering::Concurrent,
    }
  }
}
