use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// The single, static reference point for all time calculations in the engine.
// It is initialized lazily on its first use.
static ENGINE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A source of time for the engine.
///
/// All expiry checks, access timestamps, and sync-message timestamps flow
/// through this capability, so tests can drive the cache deterministically
/// with a [`ManualClock`].
pub trait Clock: Send + Sync {
  /// Returns the time elapsed since the engine epoch.
  fn now(&self) -> Duration;

  /// Wall-clock nanoseconds since the UNIX epoch. The engine epoch is
  /// per-process, so anything compared across writers (sync-message
  /// timestamps, `updated_at`) uses this basis instead; TTL and access
  /// bookkeeping stay on the monotonic epoch.
  fn wall_nanos(&self) -> u64;
}

/// The default clock, backed by a monotonic `Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  #[inline]
  fn now(&self) -> Duration {
    Instant::now().saturating_duration_since(*ENGINE_EPOCH)
  }

  fn wall_nanos(&self) -> u64 {
    SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_nanos() as u64)
      .unwrap_or(0)
  }
}

/// A hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
  now: Mutex<Duration>,
}

impl ManualClock {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Moves the clock forward by `delta`.
  pub fn advance(&self, delta: Duration) {
    let mut now = self.now.lock();
    *now += delta;
  }

  /// Sets the clock to an absolute offset from the epoch.
  pub fn set(&self, at: Duration) {
    *self.now.lock() = at;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Duration {
    *self.now.lock()
  }

  // Tests share one manual clock across writers, so the monotonic reading
  // doubles as the wall reading.
  fn wall_nanos(&self) -> u64 {
    self.now.lock().as_nanos() as u64
  }
}

/// Helper to express a `Clock` reading as nanoseconds, the unit the entry
/// metadata and sync messages store.
#[inline]
pub(crate) fn now_nanos(clock: &dyn Clock) -> u64 {
  clock.now().as_nanos() as u64
}
