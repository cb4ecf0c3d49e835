use crate::error::SettleError;
use crate::handle::Settlement;
use crate::options::{Concurrency, PoolOptions};
use crate::pool::Pool;

use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;

use tracing::debug;

/// Runs every task at once and collects the outcomes in argument order.
///
/// An empty input resolves to an empty sequence without building a pool.
pub async fn parallel<T, E, I, G, Fut>(tasks: I) -> Settlement<T, E>
where
  T: Send + 'static,
  E: fmt::Debug + Send + 'static,
  I: IntoIterator<Item = G>,
  G: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  parallel_with(tasks, PoolOptions::default()).await
}

/// Runs the tasks one at a time in argument order; each starts only after the
/// previous one completed.
pub async fn serie<T, E, I, G, Fut>(tasks: I) -> Settlement<T, E>
where
  T: Send + 'static,
  E: fmt::Debug + Send + 'static,
  I: IntoIterator<Item = G>,
  G: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  serie_with(tasks, PoolOptions::default()).await
}

/// [`parallel`] with explicit options, e.g. a name or fail-fast mode.
pub async fn parallel_with<T, E, I, G, Fut>(tasks: I, options: PoolOptions) -> Settlement<T, E>
where
  T: Send + 'static,
  E: fmt::Debug + Send + 'static,
  I: IntoIterator<Item = G>,
  G: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  run_all(tasks, Concurrency::Unbounded, options).await
}

/// [`serie`] with explicit options.
pub async fn serie_with<T, E, I, G, Fut>(tasks: I, options: PoolOptions) -> Settlement<T, E>
where
  T: Send + 'static,
  E: fmt::Debug + Send + 'static,
  I: IntoIterator<Item = G>,
  G: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  run_all(tasks, Concurrency::Limited(NonZeroUsize::MIN), options).await
}

async fn run_all<T, E, I, G, Fut>(tasks: I, concurrency: Concurrency, options: PoolOptions) -> Settlement<T, E>
where
  T: Send + 'static,
  E: fmt::Debug + Send + 'static,
  I: IntoIterator<Item = G>,
  G: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  let mut tasks = tasks.into_iter().peekable();
  if tasks.peek().is_none() {
    return Ok(Vec::new());
  }

  let pool = Pool::with_options(concurrency, options.auto_start(true)).map_err(SettleError::Pool)?;
  for generator in tasks {
    if let Err(e) = pool.enqueue(generator) {
      // A fail-fast pool can settle while still admitting; its handle carries the cause.
      debug!(pool_name = %pool.name(), "Stopped admitting tasks: {}", e);
      break;
    }
  }
  pool.close().await_result().await
}
