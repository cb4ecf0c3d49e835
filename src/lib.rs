//! A Tokio-based pool that runs dynamically submitted futures under a
//! concurrency limit and collects their outcomes in submission order, with
//! fail-fast or accumulate-errors policies and lifecycle events.

mod diagnostics;
mod error;
mod events;
mod handle;
mod ops;
mod options;
mod pool;
mod results;
mod task;

pub use diagnostics::{Diagnostics, DiagnosticsSink, Severity};
pub use error::{PoolError, SettleError, TaskCause, TaskFailure};
pub use events::{PoolEvent, PoolStats};
pub use handle::{ResultHandle, Settlement};
pub use ops::{parallel, parallel_with, serie, serie_with};
pub use options::{Concurrency, PoolOptions};
pub use pool::{Lifecycle, Pool};
pub use task::{task, Outcome, TaskGenerator, TaskToExecute};
