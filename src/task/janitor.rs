use crate::orchestrator::{CacheOrchestrator, EngineShared};

use std::sync::Weak;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Spawns the periodic expiry sweep. Holds only a weak reference, so the
/// task winds down on its own once the cache is dropped; the engine also
/// aborts it eagerly from its own drop.
pub(crate) fn spawn(shared: Weak<EngineShared>, interval: Duration) -> tokio::task::JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let Some(shared) = shared.upgrade() else {
        break;
      };
      let cache = CacheOrchestrator { shared };
      let swept = cache.cleanup().await;
      if swept > 0 {
        debug!(swept, "janitor removed expired entries");
      }
    }
  })
}
