use std::fmt;
use std::sync::Arc;

/// Severity attached to each diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
  Debug,
  Info,
  Warn,
  Error,
}

pub type DiagnosticsSink = Arc<dyn Fn(Severity, &str) + Send + Sync + 'static>;

/// Where a pool sends its diagnostic messages.
///
/// Each pool owns its own sink; there's no process-wide registry.
#[derive(Clone, Default)]
pub enum Diagnostics {
  /// Messages are dropped.
  #[default]
  Silent,
  /// Messages are forwarded to `tracing` at the matching level.
  Tracing,
  /// Messages are handed to a caller-supplied callback.
  Sink(DiagnosticsSink),
}

impl fmt::Debug for Diagnostics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Diagnostics::Silent => f.write_str("Diagnostics::Silent"),
      Diagnostics::Tracing => f.write_str("Diagnostics::Tracing"),
      Diagnostics::Sink(_) => f.write_str("Diagnostics::Sink(..)"),
    }
  }
}

impl Diagnostics {
  /// `true` selects the default `tracing` sink, `false` silences the pool.
  pub fn from_verbose(verbose: bool) -> Self {
    if verbose {
      Diagnostics::Tracing
    } else {
      Diagnostics::Silent
    }
  }

  pub fn sink(callback: impl Fn(Severity, &str) + Send + Sync + 'static) -> Self {
    Diagnostics::Sink(Arc::new(callback))
  }

  pub fn is_silent(&self) -> bool {
    matches!(self, Diagnostics::Silent)
  }

  pub(crate) fn emit(&self, pool_name: &str, severity: Severity, message: &str) {
    match self {
      Diagnostics::Silent => {}
      Diagnostics::Tracing => match severity {
        Severity::Debug => tracing::debug!(pool_name = %pool_name, "{}", message),
        Severity::Info => tracing::info!(pool_name = %pool_name, "{}", message),
        Severity::Warn => tracing::warn!(pool_name = %pool_name, "{}", message),
        Severity::Error => tracing::error!(pool_name = %pool_name, "{}", message),
      },
      Diagnostics::Sink(callback) => {
        let line = format!("[{pool_name}] {message}");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(severity, &line)));
        if result.is_err() {
          tracing::error!(pool_name = %pool_name, "Diagnostics sink panicked; message dropped.");
        }
      }
    }
  }
}
