use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, trace};

/// Lifecycle events a pool emits to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
  /// The pool started scheduling.
  Start,
  /// Launches brought the running count up to the concurrency limit.
  Full,
  /// A completion left exactly one free slot.
  Available,
  /// A task completed, successfully or not.
  Next,
  /// The pool settled (resolved or rejected).
  Close,
}

/// A point-in-time view of the pool's counters, handed to every listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
  pub running: usize,
  pub waiting: usize,
  pub completed: usize,
  pub submitted: usize,
}

pub(crate) type Listener = Arc<dyn Fn(&PoolStats) + Send + Sync + 'static>;

struct ListenerRecord {
  callback: Listener,
  once: bool,
}

/// Per-pool registry of listeners, kept in registration order per event.
pub(crate) struct EventBus {
  listeners: Mutex<HashMap<PoolEvent, Vec<ListenerRecord>>>,
}

impl fmt::Debug for EventBus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let listener_count = self
      .listeners
      .try_lock()
      .map_or(0, |guard| guard.values().map(Vec::len).sum());
    f.debug_struct("EventBus")
      .field("listener_count", &listener_count)
      .finish()
  }
}

impl EventBus {
  pub(crate) fn new() -> Self {
    Self {
      listeners: Mutex::new(HashMap::new()),
    }
  }

  pub(crate) fn on(&self, event: PoolEvent, callback: Listener) {
    self.register(event, callback, false);
  }

  pub(crate) fn once(&self, event: PoolEvent, callback: Listener) {
    self.register(event, callback, true);
  }

  fn register(&self, event: PoolEvent, callback: Listener, once: bool) {
    let mut guard = self.listeners.lock();
    let records = guard.entry(event).or_default();
    records.push(ListenerRecord { callback, once });
    trace!(?event, once, total = records.len(), "EventBus: Registered listener.");
  }

  /// Drops every registered listener. Callbacks are released outside the lock.
  pub(crate) fn clear(&self) {
    let listeners = std::mem::take(&mut *self.listeners.lock());
    trace!(
      dropped = listeners.values().map(Vec::len).sum::<usize>(),
      "EventBus: Cleared listeners."
    );
    drop(listeners);
  }

  #[cfg(test)]
  pub(crate) fn listener_count(&self, event: PoolEvent) -> usize {
    self.listeners.lock().get(&event).map_or(0, Vec::len)
  }

  /// Invokes every listener for `event` in registration order.
  ///
  /// The listener list is snapshotted and one-shot records are dropped under the
  /// lock; callbacks then run without it, so they may register listeners or
  /// re-enter the pool.
  pub(crate) fn emit(&self, event: PoolEvent, stats: &PoolStats) {
    let callbacks: Vec<Listener> = {
      let mut guard = self.listeners.lock();
      let Some(records) = guard.get_mut(&event) else {
        return;
      };
      let snapshot = records.iter().map(|record| record.callback.clone()).collect();
      records.retain(|record| !record.once);
      snapshot
    };

    trace!(?event, listeners = callbacks.len(), "EventBus: Dispatching event.");

    for callback in callbacks {
      let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(stats)));
      if result.is_err() {
        error!(?event, "A pool event listener panicked during execution.");
      }
    }
  }
}
