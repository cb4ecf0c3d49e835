use crate::diagnostics::Severity;
use crate::error::{PoolError, SettleError, TaskCause, TaskFailure};
use crate::events::{EventBus, Listener, PoolEvent, PoolStats};
use crate::handle::{ResultHandle, Settlement};
use crate::options::{Concurrency, PoolOptions};
use crate::results::ResultSlots;
use crate::task::{self, Outcome, PendingTask};

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, trace, Instrument};

/// Where a pool is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Created, not yet started. Admitted tasks wait in the queue.
  Idle,
  /// Scheduling tasks and accepting admissions.
  Started,
  /// Closed; remaining work is draining.
  Draining,
  /// Every task finished and the ordered outcomes were delivered.
  Resolved,
  /// Fail-fast mode observed a task failure.
  Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
  Resolved,
  Rejected,
}

/// Why a scheduling pass runs. Only completions emit `Available` and `Next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
  Admission,
  Start,
  Completion,
}

/// Side effects recorded under the state lock and flushed after it is released.
enum Effect {
  Event(PoolEvent, PoolStats),
  Diagnostic(Severity, String),
}

/// Effects of one locked section. The settlement, if any, is delivered after
/// every event and diagnostic has been flushed.
struct Effects<T, E> {
  queued: Vec<Effect>,
  settlement: Option<(oneshot::Sender<Settlement<T, E>>, Settlement<T, E>)>,
}

impl<T, E> Default for Effects<T, E> {
  fn default() -> Self {
    Self {
      queued: Vec::new(),
      settlement: None,
    }
  }
}

impl<T, E> Effects<T, E> {
  fn event(&mut self, event: PoolEvent, stats: PoolStats) {
    self.queued.push(Effect::Event(event, stats));
  }

  fn diagnostic(&mut self, severity: Severity, message: String) {
    self.queued.push(Effect::Diagnostic(severity, message));
  }

  fn settle(&mut self, state: &mut PoolState<T, E>, settlement: Settlement<T, E>) {
    if let Some(tx) = state.settle_tx.take() {
      self.settlement = Some((tx, settlement));
    }
  }
}

struct PoolState<T, E> {
  queue: VecDeque<PendingTask<T, E>>,
  running: HashMap<usize, JoinHandle<()>>,
  results: ResultSlots<T, E>,
  next_index: usize,
  completed: usize,
  started: bool,
  closed: bool,
  settled: Option<Settled>,
  rejected_index: Option<usize>,
  settle_tx: Option<oneshot::Sender<Settlement<T, E>>>,
  settle_rx: Option<oneshot::Receiver<Settlement<T, E>>>,
}

impl<T, E> PoolState<T, E> {
  fn stats(&self) -> PoolStats {
    PoolStats {
      running: self.running.len(),
      waiting: self.queue.len(),
      completed: self.completed,
      submitted: self.next_index,
    }
  }
}

struct PoolInner<T, E> {
  name: String,
  concurrency: Concurrency,
  options: PoolOptions,
  runtime: TokioHandle,
  events: EventBus,
  state: Mutex<PoolState<T, E>>,
}

/// A bounded-concurrency pool of futures whose outcomes are collected in
/// submission order.
///
/// Cloning a `Pool` yields another handle to the same pool.
pub struct Pool<T, E> {
  inner: Arc<PoolInner<T, E>>,
}

impl<T, E> Clone for Pool<T, E> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T, E> fmt::Debug for Pool<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let stats = self.inner.state.try_lock().map(|state| state.stats());
    f.debug_struct("Pool")
      .field("name", &self.inner.name)
      .field("concurrency", &self.inner.concurrency)
      .field("stats", &stats)
      .field("events", &self.inner.events)
      .finish_non_exhaustive()
  }
}

impl<T, E> Pool<T, E>
where
  T: Send + 'static,
  E: fmt::Debug + Send + 'static,
{
  /// A pool running at most `limit` tasks at once, with default options.
  pub fn new(limit: usize) -> Result<Self, PoolError> {
    Self::with_options(Concurrency::limited(limit)?, PoolOptions::default())
  }

  /// A pool that launches every admitted task immediately.
  pub fn unbounded() -> Result<Self, PoolError> {
    Self::with_options(Concurrency::Unbounded, PoolOptions::default())
  }

  pub fn with_options(concurrency: Concurrency, options: PoolOptions) -> Result<Self, PoolError> {
    let runtime = options.resolve_runtime()?;
    let (settle_tx, settle_rx) = oneshot::channel();
    debug!(pool_name = %options.name, ?concurrency, reject_on_error = options.reject_on_error, "Creating pool.");

    Ok(Self {
      inner: Arc::new(PoolInner {
        name: options.name.clone(),
        concurrency,
        options,
        runtime,
        events: EventBus::new(),
        state: Mutex::new(PoolState {
          queue: VecDeque::new(),
          running: HashMap::new(),
          results: ResultSlots::new(),
          next_index: 0,
          completed: 0,
          started: false,
          closed: false,
          settled: None,
          rejected_index: None,
          settle_tx: Some(settle_tx),
          settle_rx: Some(settle_rx),
        }),
      }),
    })
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  pub fn concurrency(&self) -> Concurrency {
    self.inner.concurrency
  }

  /// Starts scheduling. Only the first call emits [`PoolEvent::Start`]; every
  /// call runs a scheduling pass.
  pub fn start(&self) {
    let mut effects = Effects::default();
    {
      let mut state = self.inner.state.lock();
      self.inner.start_locked(&mut state, &mut effects);
    }
    self.inner.flush(effects);
  }

  /// Admits a task generator and returns its submission index.
  ///
  /// The generator is invoked when the pool launches the task. Its outcome is
  /// only observable through the pool's [`ResultHandle`].
  ///
  /// # Errors
  /// Returns `PoolError::PoolSettled` once the pool has settled, and
  /// `PoolError::PoolClosed` after `close()`.
  pub fn enqueue<G, Fut>(&self, generator: G) -> Result<usize, PoolError>
  where
    G: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    let mut effects = Effects::default();
    let index = {
      let mut state = self.inner.state.lock();
      if state.settled.is_some() {
        debug!(pool_name = %self.inner.name, "Enqueue: Attempted to submit task to a settled pool.");
        return Err(PoolError::PoolSettled);
      }
      if state.closed {
        debug!(pool_name = %self.inner.name, "Enqueue: Attempted to submit task to a closed pool.");
        return Err(PoolError::PoolClosed);
      }

      let index = state.next_index;
      state.next_index += 1;
      state.queue.push_back(PendingTask {
        index,
        generator: task::task(generator),
      });
      trace!(pool_name = %self.inner.name, index, waiting = state.queue.len(), "Task admitted.");

      if self.inner.options.auto_start && !state.started {
        self.inner.start_locked(&mut state, &mut effects);
      } else if state.started {
        self.inner.schedule(&mut state, &mut effects, Trigger::Admission);
      }
      index
    };
    self.inner.flush(effects);
    Ok(index)
  }

  /// Stops admissions and returns the pool's result handle.
  ///
  /// Queued tasks still run. Also starts the pool if it has not started, so a
  /// pool with nothing admitted resolves immediately to an empty sequence.
  /// Only the first call receives the live handle; later handles yield
  /// [`PoolError::ResultUnavailable`].
  pub fn close(&self) -> ResultHandle<T, E> {
    let mut effects = Effects::default();
    let receiver = {
      let mut state = self.inner.state.lock();
      if !state.closed {
        debug!(pool_name = %self.inner.name, waiting = state.queue.len(), running = state.running.len(), "Closing pool.");
        state.closed = true;
      }
      let receiver = state.settle_rx.take();
      self.inner.start_locked(&mut state, &mut effects);
      receiver
    };
    self.inner.flush(effects);
    ResultHandle {
      pool_name: self.inner.name.clone(),
      receiver,
    }
  }

  /// Registers a listener invoked on every occurrence of `event`.
  ///
  /// Listeners for one event fire in registration order, after the pool's
  /// internal lock is released. All listeners are dropped once the pool
  /// settles, and a listener registered on a settled pool is dropped at once.
  pub fn on(&self, event: PoolEvent, listener: impl Fn(&PoolStats) + Send + Sync + 'static) -> &Self {
    self.register(event, Arc::new(listener), false);
    self
  }

  /// Registers a listener removed after its first invocation.
  pub fn once(&self, event: PoolEvent, listener: impl Fn(&PoolStats) + Send + Sync + 'static) -> &Self {
    self.register(event, Arc::new(listener), true);
    self
  }

  fn register(&self, event: PoolEvent, listener: Listener, once: bool) {
    // The state lock is held through the insert, ordering it against settlement.
    let state = self.inner.state.lock();
    if state.settled.is_some() {
      trace!(pool_name = %self.inner.name, ?event, "Dropping listener registered on a settled pool.");
      return;
    }
    if once {
      self.inner.events.once(event, listener);
    } else {
      self.inner.events.on(event, listener);
    }
  }
}

impl<T, E> Pool<T, E> {
  pub fn running_count(&self) -> usize {
    self.inner.state.lock().running.len()
  }

  pub fn waiting_count(&self) -> usize {
    self.inner.state.lock().queue.len()
  }

  pub fn completed_count(&self) -> usize {
    self.inner.state.lock().completed
  }

  pub fn is_started(&self) -> bool {
    self.inner.state.lock().started
  }

  pub fn is_closed(&self) -> bool {
    self.inner.state.lock().closed
  }

  pub fn is_settled(&self) -> bool {
    self.inner.state.lock().settled.is_some()
  }

  /// Index of the task whose failure rejected the pool, in fail-fast mode.
  pub fn rejected_index(&self) -> Option<usize> {
    self.inner.state.lock().rejected_index
  }

  pub fn stats(&self) -> PoolStats {
    self.inner.state.lock().stats()
  }

  pub fn lifecycle(&self) -> Lifecycle {
    let state = self.inner.state.lock();
    match state.settled {
      Some(Settled::Resolved) => Lifecycle::Resolved,
      Some(Settled::Rejected) => Lifecycle::Rejected,
      None if state.closed && state.started => Lifecycle::Draining,
      None if state.started => Lifecycle::Started,
      None => Lifecycle::Idle,
    }
  }
}

impl<T, E> PoolInner<T, E>
where
  T: Send + 'static,
  E: fmt::Debug + Send + 'static,
{
  fn start_locked(self: &Arc<Self>, state: &mut PoolState<T, E>, effects: &mut Effects<T, E>) {
    if !state.started && state.settled.is_none() {
      state.started = true;
      debug!(pool_name = %self.name, waiting = state.queue.len(), "Pool started.");
      effects.diagnostic(Severity::Debug, format!("started with {} waiting task(s)", state.queue.len()));
      effects.event(PoolEvent::Start, state.stats());
    }
    self.schedule(state, effects, Trigger::Start);
  }

  /// One scheduling pass: fill free slots from the queue in FIFO order, then
  /// emit whatever the resulting state calls for.
  fn schedule(self: &Arc<Self>, state: &mut PoolState<T, E>, effects: &mut Effects<T, E>, trigger: Trigger) {
    if !state.started || state.settled.is_some() {
      return;
    }

    let mut launched = 0usize;
    while self.concurrency.has_room(state.running.len()) {
      let Some(pending) = state.queue.pop_front() else {
        break;
      };
      self.launch(state, pending);
      launched += 1;
    }

    let became_full = launched > 0 && self.concurrency.is_saturated(state.running.len());
    let drained = state.queue.is_empty() && state.running.is_empty();

    if became_full {
      trace!(pool_name = %self.name, launched, "Pool is full.");
      effects.event(PoolEvent::Full, state.stats());
    } else if trigger == Trigger::Completion && !(drained && state.closed) {
      let one_free = self
        .concurrency
        .limit()
        .is_some_and(|limit| state.running.len() == limit - 1);
      if one_free {
        effects.event(PoolEvent::Available, state.stats());
      }
    }

    if trigger == Trigger::Completion {
      effects.event(PoolEvent::Next, state.stats());
    }

    if drained && state.closed {
      self.resolve(state, effects);
    }
  }

  fn launch(self: &Arc<Self>, state: &mut PoolState<T, E>, pending: PendingTask<T, E>) {
    let index = pending.index;
    let inner = Arc::clone(self);
    let span = info_span!("pool_task", pool_name = %self.name, index);

    trace!(pool_name = %self.name, index, running = state.running.len() + 1, "Launching task.");
    let handle = self.runtime.spawn(
      async move {
        let result = task::execute(pending.generator).await;
        inner.complete(index, result);
      }
      .instrument(span),
    );
    state.running.insert(index, handle);
  }

  /// Completion continuation for the task at `index`.
  fn complete(self: &Arc<Self>, index: usize, result: Result<T, TaskCause<E>>) {
    let mut effects = Effects::default();
    {
      let mut state = self.state.lock();
      if state.settled.is_some() {
        debug!(pool_name = %self.name, index, "Discarding outcome of task that finished after the pool settled.");
        effects.diagnostic(
          Severity::Debug,
          format!("discarded outcome of task #{index} (pool already settled)"),
        );
      } else if state.running.remove(&index).is_none() {
        effects.diagnostic(Severity::Error, format!("completion for untracked task #{index}"));
      } else {
        self.record(&mut state, &mut effects, index, result);
        if state.settled.is_none() {
          self.schedule(&mut state, &mut effects, Trigger::Completion);
        }
      }
    }
    self.flush(effects);
  }

  fn record(
    &self,
    state: &mut PoolState<T, E>,
    effects: &mut Effects<T, E>,
    index: usize,
    result: Result<T, TaskCause<E>>,
  ) {
    let outcome = match result {
      Ok(value) => {
        trace!(pool_name = %self.name, index, "Task succeeded.");
        Outcome::Success(value)
      }
      Err(cause) => {
        let failure = TaskFailure { index, cause };
        if self.options.reject_on_error {
          self.reject(state, effects, failure);
          return;
        }
        debug!(pool_name = %self.name, index, cause = ?failure.cause, "Task failed; recording failure.");
        effects.diagnostic(Severity::Warn, format!("task #{index} failed: {:?}", failure.cause));
        Outcome::Failure(failure)
      }
    };

    match state.results.set(index, outcome) {
      Ok(()) => state.completed += 1,
      Err(e) => effects.diagnostic(Severity::Error, e.to_string()),
    }
  }

  /// Fail-fast termination. Queued tasks are abandoned; tasks still running are
  /// detached and their outcomes will be discarded.
  fn reject(&self, state: &mut PoolState<T, E>, effects: &mut Effects<T, E>, failure: TaskFailure<E>) {
    let abandoned = state.queue.len();
    let detached = state.running.len();
    debug!(pool_name = %self.name, index = failure.index, abandoned, detached, "Rejecting pool on first failure.");

    state.settled = Some(Settled::Rejected);
    state.closed = true;
    state.rejected_index = Some(failure.index);
    state.queue.clear();
    state.running.clear();
    state.results.clear();

    effects.diagnostic(
      Severity::Error,
      format!(
        "rejected by task #{} ({:?}); abandoned {abandoned} queued, detached {detached} running",
        failure.index, failure.cause
      ),
    );
    effects.event(PoolEvent::Close, state.stats());
    effects.settle(state, Err(SettleError::Rejected(failure)));
  }

  fn resolve(&self, state: &mut PoolState<T, E>, effects: &mut Effects<T, E>) {
    state.settled = Some(Settled::Resolved);
    let assigned = state.next_index;
    let settlement = match state.results.finalize(assigned) {
      Ok(outcomes) => {
        let failed = outcomes.iter().filter(|outcome| outcome.is_failure()).count();
        debug!(pool_name = %self.name, assigned, failed, "Pool resolved.");
        effects.diagnostic(Severity::Info, format!("resolved {assigned} task(s), {failed} failed"));
        Ok(outcomes)
      }
      Err(e) => {
        effects.diagnostic(Severity::Error, format!("could not finalize results: {e}"));
        Err(SettleError::Pool(e))
      }
    };
    effects.event(PoolEvent::Close, state.stats());
    effects.settle(state, settlement);
  }
}

impl<T, E> PoolInner<T, E> {
  fn flush(&self, effects: Effects<T, E>) {
    for effect in effects.queued {
      match effect {
        Effect::Event(event, stats) => self.events.emit(event, &stats),
        Effect::Diagnostic(severity, message) => self.options.diagnostics.emit(&self.name, severity, &message),
      }
    }

    // `Close` has been dispatched by now; no listener can fire again.
    if let Some((tx, settlement)) = effects.settlement {
      self.events.clear();
      if tx.send(settlement).is_err() {
        trace!(pool_name = %self.name, "Result handle was dropped before the pool settled.");
      }
    }
  }
}
