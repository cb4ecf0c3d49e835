use crate::error::{TaskCause, TaskFailure};

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;

/// The type of future a task generator produces.
/// It must be `Send` and `'static`, and resolve to `Result<T, E>`.
pub type TaskToExecute<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// A boxed task generator. Invoked once, when the pool launches the task.
///
/// Useful for building lists of heterogeneous tasks for [`parallel`](crate::parallel)
/// and [`serie`](crate::serie).
pub type TaskGenerator<T, E> = Box<dyn FnOnce() -> TaskToExecute<T, E> + Send + 'static>;

/// Boxes a closure returning a future into a [`TaskGenerator`].
pub fn task<T, E, G, Fut>(generator: G) -> TaskGenerator<T, E>
where
  G: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  Box::new(move || Box::pin(generator()) as TaskToExecute<T, E>)
}

/// The recorded result of one task, stored at its submission index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
  Success(T),
  Failure(TaskFailure<E>),
}

impl<T, E> Outcome<T, E> {
  pub fn is_success(&self) -> bool {
    matches!(self, Outcome::Success(_))
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, Outcome::Failure(_))
  }

  pub fn success(&self) -> Option<&T> {
    match self {
      Outcome::Success(value) => Some(value),
      Outcome::Failure(_) => None,
    }
  }

  pub fn failure(&self) -> Option<&TaskFailure<E>> {
    match self {
      Outcome::Success(_) => None,
      Outcome::Failure(failure) => Some(failure),
    }
  }

  pub fn into_result(self) -> Result<T, TaskFailure<E>> {
    match self {
      Outcome::Success(value) => Ok(value),
      Outcome::Failure(failure) => Err(failure),
    }
  }
}

/// Internal representation of an admitted task waiting in the queue.
pub(crate) struct PendingTask<T, E> {
  pub(crate) index: usize,
  pub(crate) generator: TaskGenerator<T, E>,
}

/// Invokes the generator and drives its future, converting panics at either
/// step into [`TaskCause::Panicked`].
pub(crate) async fn execute<T, E>(generator: TaskGenerator<T, E>) -> Result<T, TaskCause<E>> {
  let future = match std::panic::catch_unwind(AssertUnwindSafe(generator)) {
    Ok(future) => future,
    Err(payload) => return Err(TaskCause::Panicked(panic_message(payload.as_ref()))),
  };

  match AssertUnwindSafe(future).catch_unwind().await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(TaskCause::Returned(e)),
    Err(payload) => Err(TaskCause::Panicked(panic_message(payload.as_ref()))),
  }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "<non-string panic payload>".to_string()
  }
}
