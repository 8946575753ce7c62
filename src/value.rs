use crate::error::CacheError;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hash, Hasher};

/// The deepest nesting the engine will serialize before substituting a
/// circular-reference marker. A lossy-but-safe degradation, not an error.
pub(crate) const MAX_VALUE_DEPTH: usize = 128;

/// Strings at or below this length take the serialization fast path.
pub(crate) const SHORT_STR_LEN: usize = 40;

const CIRCULAR_MARKER: &str = "[circular]";

/// The closed set of values the engine can own.
///
/// Maps are keyed by strings and kept ordered so that structurally equal
/// values fingerprint and serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  Bytes(Vec<u8>),
  Array(Vec<CacheValue>),
  Map(BTreeMap<String, CacheValue>),
}

/// Coarse classification used by the tier selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
  Primitive,
  Structured,
  Binary,
}

impl CacheValue {
  pub fn kind(&self) -> DataKind {
    match self {
      CacheValue::Null
      | CacheValue::Bool(_)
      | CacheValue::Int(_)
      | CacheValue::Float(_)
      | CacheValue::Str(_) => DataKind::Primitive,
      CacheValue::Bytes(_) => DataKind::Binary,
      CacheValue::Array(_) | CacheValue::Map(_) => DataKind::Structured,
    }
  }

  /// Primitive-like values skip the fingerprint cache entirely.
  pub(crate) fn is_fast_path(&self) -> bool {
    match self {
      CacheValue::Null | CacheValue::Bool(_) | CacheValue::Int(_) | CacheValue::Float(_) => true,
      CacheValue::Str(s) => s.len() <= SHORT_STR_LEN,
      _ => false,
    }
  }

  /// Structural fingerprint of the value tree. Hashes the structure
  /// directly rather than hashing serialized bytes, so a cache hit skips
  /// serialization entirely.
  pub(crate) fn fingerprint(&self, state: &ahash::RandomState) -> u64 {
    let mut hasher = state.build_hasher();
    self.hash_into(&mut hasher, 0);
    hasher.finish()
  }

  fn hash_into<H: Hasher>(&self, hasher: &mut H, depth: usize) {
    if depth > MAX_VALUE_DEPTH {
      CIRCULAR_MARKER.hash(hasher);
      return;
    }
    match self {
      CacheValue::Null => 0u8.hash(hasher),
      CacheValue::Bool(b) => {
        1u8.hash(hasher);
        b.hash(hasher);
      }
      CacheValue::Int(i) => {
        2u8.hash(hasher);
        i.hash(hasher);
      }
      CacheValue::Float(x) => {
        3u8.hash(hasher);
        x.to_bits().hash(hasher);
      }
      CacheValue::Str(s) => {
        4u8.hash(hasher);
        s.hash(hasher);
      }
      CacheValue::Bytes(b) => {
        5u8.hash(hasher);
        b.hash(hasher);
      }
      CacheValue::Array(items) => {
        6u8.hash(hasher);
        items.len().hash(hasher);
        for item in items {
          item.hash_into(hasher, depth + 1);
        }
      }
      CacheValue::Map(map) => {
        7u8.hash(hasher);
        map.len().hash(hasher);
        for (key, value) in map {
          key.hash(hasher);
          value.hash_into(hasher, depth + 1);
        }
      }
    }
  }

  /// Serializes the value to its wire form (JSON bytes).
  ///
  /// Subtrees nested past [`MAX_VALUE_DEPTH`] are replaced by a marker
  /// string instead of recursing unboundedly. Non-finite floats have no
  /// JSON representation and fail with `Serialization`.
  pub fn to_wire_bytes(&self) -> Result<Vec<u8>, CacheError> {
    match self.inspect(0) {
      Inspection::Clean => {}
      Inspection::TooDeep => {
        let bounded = self.truncated(0);
        return serde_json::to_vec(&bounded)
          .map_err(|e| CacheError::Serialization(e.to_string()));
      }
      Inspection::NonFinite => {
        return Err(CacheError::Serialization(
          "non-finite float has no wire representation".to_string(),
        ));
      }
    }
    serde_json::to_vec(self).map_err(|e| CacheError::Serialization(e.to_string()))
  }

  pub fn from_wire_bytes(bytes: &[u8]) -> Result<CacheValue, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
  }

  fn inspect(&self, depth: usize) -> Inspection {
    if depth > MAX_VALUE_DEPTH {
      return Inspection::TooDeep;
    }
    match self {
      CacheValue::Float(x) if !x.is_finite() => Inspection::NonFinite,
      CacheValue::Array(items) => {
        for item in items {
          match item.inspect(depth + 1) {
            Inspection::Clean => {}
            other => return other,
          }
        }
        Inspection::Clean
      }
      CacheValue::Map(map) => {
        for value in map.values() {
          match value.inspect(depth + 1) {
            Inspection::Clean => {}
            other => return other,
          }
        }
        Inspection::Clean
      }
      _ => Inspection::Clean,
    }
  }

  // Clones the tree, substituting the marker past the depth bound.
  fn truncated(&self, depth: usize) -> CacheValue {
    if depth > MAX_VALUE_DEPTH {
      return CacheValue::Str(CIRCULAR_MARKER.to_string());
    }
    match self {
      CacheValue::Array(items) => {
        CacheValue::Array(items.iter().map(|i| i.truncated(depth + 1)).collect())
      }
      CacheValue::Map(map) => CacheValue::Map(
        map
          .iter()
          .map(|(k, v)| (k.clone(), v.truncated(depth + 1)))
          .collect(),
      ),
      other => other.clone(),
    }
  }
}

enum Inspection {
  Clean,
  TooDeep,
  NonFinite,
}

impl From<i64> for CacheValue {
  fn from(v: i64) -> Self {
    CacheValue::Int(v)
  }
}

impl From<bool> for CacheValue {
  fn from(v: bool) -> Self {
    CacheValue::Bool(v)
  }
}

impl From<f64> for CacheValue {
  fn from(v: f64) -> Self {
    CacheValue::Float(v)
  }
}

impl From<&str> for CacheValue {
  fn from(v: &str) -> Self {
    CacheValue::Str(v.to_string())
  }
}

impl From<String> for CacheValue {
  fn from(v: String) -> Self {
    CacheValue::Str(v)
  }
}

impl From<Vec<u8>> for CacheValue {
  fn from(v: Vec<u8>) -> Self {
    CacheValue::Bytes(v)
  }
}
