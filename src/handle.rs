use crate::error::{PoolError, SettleError};
use crate::task::Outcome;

use std::fmt;
use std::future::IntoFuture;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

/// What a settled pool delivers: the ordered outcomes, or why there are none.
pub type Settlement<T, E> = Result<Vec<Outcome<T, E>>, SettleError<E>>;

/// Awaitable result of a pool, returned by [`Pool::close`](crate::Pool::close).
///
/// Yields every task's [`Outcome`] in submission order once the pool resolves,
/// or the first failure when the pool runs in fail-fast mode.
pub struct ResultHandle<T, E> {
  pub(crate) pool_name: String,
  pub(crate) receiver: Option<oneshot::Receiver<Settlement<T, E>>>,
}

impl<T, E> fmt::Debug for ResultHandle<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResultHandle")
      .field("pool_name", &self.pool_name)
      .field("has_receiver", &self.receiver.is_some())
      .finish()
  }
}

impl<T, E> ResultHandle<T, E> {
  /// Returns `false` if this handle came from a repeated `close()` and will
  /// only ever yield [`PoolError::ResultUnavailable`].
  pub fn is_live(&self) -> bool {
    self.receiver.is_some()
  }

  /// Awaits the pool's settlement.
  ///
  /// # Errors
  /// Returns `SettleError::Rejected` if a fail-fast pool observed a task failure.
  /// Returns `PoolError::ResultUnavailable` if a previous `close()` already took the result.
  /// Returns `PoolError::ResultChannelError` if the pool was dropped before settling.
  pub async fn await_result(mut self) -> Settlement<T, E> {
    match self.receiver.take() {
      Some(rx) => match rx.await {
        Ok(settlement) => settlement,
        Err(recv_error) => {
          tracing::warn!(pool_name = %self.pool_name, "Result channel receive error: {}", recv_error);
          Err(SettleError::Pool(PoolError::ResultChannelError(format!(
            "pool '{}' dropped its result sender: {}",
            self.pool_name, recv_error
          ))))
        }
      },
      None => Err(SettleError::Pool(PoolError::ResultUnavailable)),
    }
  }
}

impl<T: Send + 'static, E: Send + 'static> IntoFuture for ResultHandle<T, E> {
  type Output = Settlement<T, E>;
  type IntoFuture = BoxFuture<'static, Settlement<T, E>>;

  fn into_future(self) -> Self::IntoFuture {
    Box::pin(self.await_result())
  }
}
