use super::message::{decode_batch, encode_batch, SyncMessage, SyncOp};
use super::queue::OfflineQueue;
use crate::clock::now_nanos;
use crate::events::CacheEvent;
use crate::orchestrator::CacheOrchestrator;
use crate::traits::Broadcast;
use crate::value::CacheValue;
use crate::vclock::{ClockOrdering, VectorClock};

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// What a conflict resolver decided to keep. `Merge` installs a value the
/// resolver built out of both sides, counter-style.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictChoice {
  KeepLocal,
  TakeRemote,
  Merge(CacheValue),
}

/// Which way a conflict was settled, as reported to the audit hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictOutcome {
  KeptLocal,
  TookRemote,
  Merged,
}

/// Everything a custom resolver can inspect about a concurrent write pair.
pub struct ConflictContext<'a> {
  pub key: &'a str,
  /// The local value at resolution time, when it could be read back.
  pub local_value: Option<CacheValue>,
  /// Local write time, wall-clock nanoseconds since the UNIX epoch.
  pub local_updated_at: u64,
  pub local_clock: &'a VectorClock,
  pub remote: &'a SyncMessage,
}

impl ConflictContext<'_> {
  /// Decodes the remote side's value, when the message carries one.
  pub fn remote_value(&self) -> Option<CacheValue> {
    self
      .remote
      .payload
      .as_deref()
      .and_then(|payload| CacheValue::from_wire_bytes(payload).ok())
  }
}

pub trait ConflictResolver: Send + Sync {
  fn resolve(&self, ctx: &ConflictContext<'_>) -> ConflictChoice;
}

impl<F> ConflictResolver for F
where
  F: Fn(&ConflictContext<'_>) -> ConflictChoice + Send + Sync,
{
  fn resolve(&self, ctx: &ConflictContext<'_>) -> ConflictChoice {
    self(ctx)
  }
}

/// How concurrent writes to the same key are settled. Both timestamp
/// strategies break exact ties on the writer id, so every node settles the
/// same pair the same way.
#[derive(Clone)]
pub enum ConflictStrategy {
  LastWriteWins,
  FirstWriteWins,
  Custom(Arc<dyn ConflictResolver>),
}

/// Record of one settled conflict, handed to the audit hook.
#[derive(Debug, Clone)]
pub struct ConflictAudit {
  pub key: String,
  pub local_clock: VectorClock,
  pub remote_clock: VectorClock,
  pub remote_origin: String,
  pub outcome: ConflictOutcome,
  pub timestamp: u64,
}

pub type ConflictHook = Arc<dyn Fn(&ConflictAudit) + Send + Sync>;

#[derive(Clone)]
pub struct SyncConfig {
  /// How long local mutations coalesce before a batch is published.
  pub batch_window: Duration,
  /// Bound on messages held while the transport is offline; beyond it the
  /// oldest message is dropped with a warning.
  pub offline_queue_max: usize,
  /// Publish retries before a batch falls back to the offline queue.
  pub max_retries: u32,
  /// First retry delay; doubles per attempt.
  pub initial_backoff: Duration,
  pub strategy: ConflictStrategy,
  /// Invoked after every settled conflict.
  pub on_conflict: Option<ConflictHook>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      batch_window: Duration::from_millis(50),
      offline_queue_max: 1024,
      max_retries: 3,
      initial_backoff: Duration::from_millis(100),
      strategy: ConflictStrategy::LastWriteWins,
      on_conflict: None,
    }
  }
}

/// Keeps one cache in step with its peers over a `Broadcast` transport.
///
/// Local mutations arrive on an in-process channel, coalesce per key for one
/// batch window, and ship as a single encoded blob. Inbound blobs are
/// decoded, filtered for our own origin, ordered by vector clock, and
/// applied; concurrent pairs go through the configured strategy.
pub struct SyncCoordinator;

impl SyncCoordinator {
  /// Attaches a coordinator to `cache` and spawns its event loop. Dropping
  /// the returned handle aborts the loop; call [`SyncHandle::stop`] for a
  /// final flush instead.
  pub fn spawn(cache: CacheOrchestrator, transport: Arc<dyn Broadcast>, config: SyncConfig) -> SyncHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    cache.shared.attach_mutation_sender(tx);

    let (stop_tx, stop_rx) = oneshot::channel();
    // Subscribe before spawning: a peer may publish before this task is
    // first polled, and messages sent before subscription are lost.
    let inbound = transport.subscribe();
    let task = tokio::spawn(run_loop(cache, transport, config, rx, stop_rx, inbound));
    SyncHandle {
      stop: Some(stop_tx),
      task: Some(task),
    }
  }
}

/// Controls a running coordinator task.
pub struct SyncHandle {
  stop: Option<oneshot::Sender<()>>,
  task: Option<tokio::task::JoinHandle<()>>,
}

impl SyncHandle {
  /// Requests shutdown and waits for the final flush to complete.
  pub async fn stop(mut self) {
    if let Some(stop) = self.stop.take() {
      let _ = stop.send(());
    }
    if let Some(task) = self.task.take() {
      let _ = task.await;
    }
  }
}

impl Drop for SyncHandle {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

/// Pending outgoing mutations, coalesced per key. `seq` preserves arrival
/// order across keys when the batch is flushed.
struct PendingBatch {
  entries: HashMap<String, (u64, SyncMessage)>,
  next_seq: u64,
}

impl PendingBatch {
  fn new() -> Self {
    Self {
      entries: HashMap::new(),
      next_seq: 0,
    }
  }

  fn push(&mut self, message: SyncMessage) {
    // A clear supersedes everything queued before it.
    if message.op == SyncOp::Clear {
      self.entries.clear();
    }
    let seq = self.next_seq;
    self.next_seq += 1;
    self.entries.insert(message.key.clone(), (seq, message));
  }

  fn drain_ordered(&mut self) -> Vec<SyncMessage> {
    let mut drained: Vec<(u64, SyncMessage)> = self.entries.drain().map(|(_, v)| v).collect();
    drained.sort_by_key(|(seq, _)| *seq);
    drained.into_iter().map(|(_, message)| message).collect()
  }

  fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

async fn run_loop(
  cache: CacheOrchestrator,
  transport: Arc<dyn Broadcast>,
  config: SyncConfig,
  mut mutations: UnboundedReceiver<SyncMessage>,
  mut stop: oneshot::Receiver<()>,
  mut inbound: BoxStream<'static, Vec<u8>>,
) {
  let mut pending = PendingBatch::new();
  let mut offline = OfflineQueue::new(config.offline_queue_max);

  // Start one window out so the first window coalesces instead of flushing
  // immediately at time zero.
  let mut ticker = tokio::time::interval_at(
    tokio::time::Instant::now() + config.batch_window,
    config.batch_window,
  );
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = &mut stop => {
        // Pick up anything still sitting in the channel before the final flush.
        while let Ok(message) = mutations.try_recv() {
          pending.push(message);
        }
        flush(&transport, &config, &mut pending, &mut offline).await;
        break;
      }
      mutation = mutations.recv() => match mutation {
        Some(message) => pending.push(message),
        None => {
          // The cache is gone; flush what we have and exit.
          flush(&transport, &config, &mut pending, &mut offline).await;
          break;
        }
      },
      blob = inbound.next() => match blob {
        Some(blob) => apply_inbound(&cache, &config, &blob).await,
        None => {
          // Transport stream ended; keep flushing, stop receiving.
          inbound = futures_util::stream::pending().boxed();
        }
      },
      _ = ticker.tick() => {
        flush(&transport, &config, &mut pending, &mut offline).await;
      }
    }
  }
}

/// One flush cycle: while offline, park the window's batch in the bounded
/// queue; while online, replay queued messages first (oldest first) and then
/// the current window, as one published blob.
async fn flush(
  transport: &Arc<dyn Broadcast>,
  config: &SyncConfig,
  pending: &mut PendingBatch,
  offline: &mut OfflineQueue,
) {
  let batch = pending.drain_ordered();

  if !transport.is_online() {
    for message in batch {
      offline.push(message);
    }
    return;
  }

  let mut outgoing: Vec<SyncMessage> = Vec::with_capacity(offline.len() + batch.len());
  while let Some(queued) = offline.pop() {
    outgoing.push(queued);
  }
  outgoing.extend(batch);
  if outgoing.is_empty() {
    return;
  }

  let blob = match encode_batch(&outgoing) {
    Ok(blob) => blob,
    Err(err) => {
      warn!(%err, "failed to encode sync batch, discarding");
      return;
    }
  };

  let mut backoff = config.initial_backoff;
  for attempt in 0..=config.max_retries {
    match transport.publish(blob.clone()).await {
      Ok(()) => {
        debug!(messages = outgoing.len(), "published sync batch");
        return;
      }
      Err(err) => {
        warn!(attempt, %err, "sync publish failed");
        if attempt < config.max_retries {
          tokio::time::sleep(backoff).await;
          backoff *= 2;
        }
      }
    }
  }

  // Out of retries: requeue in order and try again next cycle.
  for message in outgoing {
    offline.push(message);
  }
}

async fn apply_inbound(cache: &CacheOrchestrator, config: &SyncConfig, blob: &[u8]) {
  let batch = match decode_batch(blob) {
    Ok(batch) => batch,
    Err(err) => {
      warn!(%err, "discarding undecodable sync batch");
      return;
    }
  };

  for message in batch {
    if message.origin == cache.shared.writer_id {
      continue;
    }
    if let Err(err) = apply_one(cache, config, &message).await {
      warn!(key = %message.key, %err, "failed to apply sync message");
      cache.shared.events.emit(CacheEvent::Error {
        key: Some(message.key.clone()),
        message: err.to_string(),
        timestamp: now_nanos(&*cache.shared.clock),
      });
    }
  }
}

async fn apply_one(
  cache: &CacheOrchestrator,
  config: &SyncConfig,
  message: &SyncMessage,
) -> Result<(), crate::error::CacheError> {
  let metrics = &cache.shared.metrics;

  if message.op == SyncOp::Clear {
    cache.clear_inner(false).await?;
    metrics.sync_applied.fetch_add(1, Ordering::Relaxed);
    return Ok(());
  }

  let local = cache.entry_meta(&message.key);
  let Some(local) = local else {
    // No local history: the remote write wins unconditionally.
    return take_remote(cache, message, false).await;
  };

  match local.vclock.compare(&message.vclock) {
    ClockOrdering::Dominated => take_remote(cache, message, false).await,
    ClockOrdering::Dominates | ClockOrdering::Equal => {
      // Remote is causally stale (or an echo); nothing to do.
      metrics.sync_discarded.fetch_add(1, Ordering::Relaxed);
      Ok(())
    }
    ClockOrdering::Concurrent => {
      metrics.sync_conflicts.fetch_add(1, Ordering::Relaxed);
      let choice = settle_conflict(cache, config, &local, message).await;

      if let Some(hook) = &config.on_conflict {
        hook(&ConflictAudit {
          key: message.key.clone(),
          local_clock: local.vclock.clone(),
          remote_clock: message.vclock.clone(),
          remote_origin: message.origin.clone(),
          outcome: match &choice {
            ConflictChoice::KeepLocal => ConflictOutcome::KeptLocal,
            ConflictChoice::TakeRemote => ConflictOutcome::TookRemote,
            ConflictChoice::Merge(_) => ConflictOutcome::Merged,
          },
          timestamp: now_nanos(&*cache.shared.clock),
        });
      }

      // Every resolution bumps the local writer's clock slot on top of the
      // merged history, so the settled entry strictly dominates both sides
      // and this pair never conflicts again.
      match choice {
        ConflictChoice::KeepLocal => {
          cache.absorb_remote_clock(&message.key, &message.vclock).await;
          metrics.sync_discarded.fetch_add(1, Ordering::Relaxed);
          Ok(())
        }
        ConflictChoice::TakeRemote => take_remote(cache, message, true).await,
        ConflictChoice::Merge(value) => {
          let bytes = value.to_wire_bytes()?;
          let timestamp = local.updated_at.max(message.timestamp);
          cache
            .apply_remote_set(
              &message.key,
              &bytes,
              message.version,
              &message.vclock,
              timestamp,
              true,
            )
            .await
        }
      }
    }
  }
}

async fn settle_conflict(
  cache: &CacheOrchestrator,
  config: &SyncConfig,
  local: &crate::entry::CacheEntry,
  message: &SyncMessage,
) -> ConflictChoice {
  let keep_local = match &config.strategy {
    ConflictStrategy::LastWriteWins => {
      if local.updated_at != message.timestamp {
        local.updated_at > message.timestamp
      } else {
        cache.shared.writer_id.as_str() > message.origin.as_str()
      }
    }
    ConflictStrategy::FirstWriteWins => {
      if local.updated_at != message.timestamp {
        local.updated_at < message.timestamp
      } else {
        cache.shared.writer_id.as_str() > message.origin.as_str()
      }
    }
    ConflictStrategy::Custom(resolver) => {
      let local_value = cache.peek(&message.key).await;
      return resolver.resolve(&ConflictContext {
        key: &message.key,
        local_value,
        local_updated_at: local.updated_at,
        local_clock: &local.vclock,
        remote: message,
      });
    }
  };
  if keep_local {
    ConflictChoice::KeepLocal
  } else {
    ConflictChoice::TakeRemote
  }
}

/// Installs the remote write locally. `bump` is true when this apply settles
/// a conflict and the local clock slot must advance past both histories.
async fn take_remote(
  cache: &CacheOrchestrator,
  message: &SyncMessage,
  bump: bool,
) -> Result<(), crate::error::CacheError> {
  match message.op {
    SyncOp::Set => {
      let payload = message.payload.as_deref().ok_or_else(|| {
        crate::error::CacheError::Serialization("set message without payload".into())
      })?;
      cache
        .apply_remote_set(
          &message.key,
          payload,
          message.version,
          &message.vclock,
          message.timestamp,
          bump,
        )
        .await
    }
    SyncOp::Remove => cache.apply_remote_remove(&message.key).await,
    SyncOp::Clear => cache.clear_inner(false).await,
  }
}
