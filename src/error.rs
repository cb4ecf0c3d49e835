use thiserror::Error;

/// Errors raised by the pool itself, independent of what the tasks return.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Pool is closed, cannot accept new tasks")]
  PoolClosed,

  #[error("Pool has already settled, cannot accept new tasks")]
  PoolSettled,

  #[error("Concurrency limit must be a positive integer")]
  InvalidConcurrency,

  #[error("No Tokio runtime available to spawn pool tasks on")]
  NoRuntime,

  #[error("Pool result already taken or handle was not available")]
  ResultUnavailable,

  #[error("Pool result channel error (pool dropped before settling): {0}")]
  ResultChannelError(String),

  #[error("Outcome for task #{0} was already recorded")]
  DuplicateOutcome(usize),

  #[error("No outcome was recorded for task #{0}")]
  MissingOutcome(usize),
}

/// Why a single task failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskCause<E> {
  /// The task's future resolved to `Err(e)`.
  #[error("{0}")]
  Returned(E),

  /// The generator or its future panicked. Holds the panic message when one
  /// could be extracted.
  #[error("task panicked: {0}")]
  Panicked(String),
}

impl<E> TaskCause<E> {
  /// Returns the error the task returned, if it did not panic.
  pub fn returned(&self) -> Option<&E> {
    match self {
      TaskCause::Returned(e) => Some(e),
      TaskCause::Panicked(_) => None,
    }
  }

  pub fn is_panic(&self) -> bool {
    matches!(self, TaskCause::Panicked(_))
  }
}

/// A task failure together with the submission index of the task that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("task #{index} failed: {cause}")]
pub struct TaskFailure<E> {
  pub index: usize,
  pub cause: TaskCause<E>,
}

impl<E> TaskFailure<E> {
  pub fn index(&self) -> usize {
    self.index
  }

  pub fn cause(&self) -> &TaskCause<E> {
    &self.cause
  }

  /// Unwraps the original cause, dropping the index.
  pub fn into_cause(self) -> TaskCause<E> {
    self.cause
  }
}

/// Errors yielded by a pool's [`ResultHandle`](crate::ResultHandle).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError<E> {
  /// Fail-fast mode observed its first failure.
  #[error("pool rejected: {0}")]
  Rejected(TaskFailure<E>),

  #[error(transparent)]
  Pool(#[from] PoolError),
}

impl<E> SettleError<E> {
  /// Returns the task failure that rejected the pool, if that is what happened.
  pub fn rejection(&self) -> Option<&TaskFailure<E>> {
    match self {
      SettleError::Rejected(failure) => Some(failure),
      SettleError::Pool(_) => None,
    }
  }
}
