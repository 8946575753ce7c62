use super::message::SyncMessage;

use std::collections::VecDeque;
use tracing::warn;

/// Bounded FIFO of outgoing messages accumulated while the transport is
/// disconnected. Once full, the oldest message is dropped with a warning,
/// never silently.
#[derive(Debug)]
pub(crate) struct OfflineQueue {
  messages: VecDeque<SyncMessage>,
  max_size: usize,
  dropped: u64,
}

impl OfflineQueue {
  pub(crate) fn new(max_size: usize) -> Self {
    Self {
      messages: VecDeque::new(),
      max_size: max_size.max(1),
      dropped: 0,
    }
  }

  /// Enqueues a message, evicting the oldest when full. Returns the dropped
  /// message, if any, so the caller can report it.
  pub(crate) fn push(&mut self, message: SyncMessage) -> Option<SyncMessage> {
    let mut dropped = None;
    if self.messages.len() >= self.max_size {
      dropped = self.messages.pop_front();
      self.dropped += 1;
      if let Some(ref lost) = dropped {
        warn!(
          key = %lost.key,
          queued = self.messages.len(),
          total_dropped = self.dropped,
          "offline queue full, dropping oldest sync message"
        );
      }
    }
    self.messages.push_back(message);
    dropped
  }

  pub(crate) fn pop(&mut self) -> Option<SyncMessage> {
    self.messages.pop_front()
  }

  pub(crate) fn len(&self) -> usize {
    self.messages.len()
  }

  pub(crate) fn dropped(&self) -> u64 {
    self.dropped
  }
}
