use crate::tier::TierId;

use std::sync::Arc;

/// The closed set of observable cache events, one typed payload per kind.
/// Timestamps are nanoseconds since the engine epoch.
#[derive(Debug, Clone)]
pub enum CacheEvent {
  Set {
    key: String,
    tier: TierId,
    timestamp: u64,
  },
  Get {
    key: String,
    tier: TierId,
    timestamp: u64,
  },
  Remove {
    key: String,
    tier: Option<TierId>,
    timestamp: u64,
  },
  Expired {
    key: String,
    tier: TierId,
    timestamp: u64,
  },
  Clear {
    timestamp: u64,
  },
  Error {
    key: Option<String>,
    message: String,
    timestamp: u64,
  },
}

/// A listener registered with the cache at construction time.
///
/// Dispatch is synchronous and in-line with the operation, so listeners
/// must be cheap; hand anything slow to your own channel.
pub trait EventListener: Send + Sync {
  fn on_event(&self, event: &CacheEvent);
}

impl<F> EventListener for F
where
  F: Fn(&CacheEvent) + Send + Sync,
{
  fn on_event(&self, event: &CacheEvent) {
    self(event)
  }
}

/// Fixed-size subscriber list, built once by the builder.
pub(crate) struct EventDispatcher {
  listeners: Box<[Arc<dyn EventListener>]>,
}

impl EventDispatcher {
  pub(crate) fn new(listeners: Vec<Arc<dyn EventListener>>) -> Self {
    Self {
      listeners: listeners.into_boxed_slice(),
    }
  }

  pub(crate) fn emit(&self, event: CacheEvent) {
    for listener in self.listeners.iter() {
      listener.on_event(&event);
    }
  }
}
