use crate::diagnostics::{Diagnostics, Severity};
use crate::error::PoolError;

use std::num::NonZeroUsize;

use tokio::runtime::Handle as TokioHandle;

/// How many tasks a pool may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
  Limited(NonZeroUsize),
  Unbounded,
}

impl Concurrency {
  /// A finite limit. Zero is rejected with [`PoolError::InvalidConcurrency`].
  pub fn limited(limit: usize) -> Result<Self, PoolError> {
    NonZeroUsize::new(limit)
      .map(Concurrency::Limited)
      .ok_or(PoolError::InvalidConcurrency)
  }

  /// The finite limit, or `None` when unbounded.
  pub fn limit(&self) -> Option<usize> {
    match self {
      Concurrency::Limited(limit) => Some(limit.get()),
      Concurrency::Unbounded => None,
    }
  }

  pub(crate) fn has_room(&self, running: usize) -> bool {
    self.limit().map_or(true, |limit| running < limit)
  }

  pub(crate) fn is_saturated(&self, running: usize) -> bool {
    self.limit().is_some_and(|limit| running == limit)
  }
}

impl TryFrom<usize> for Concurrency {
  type Error = PoolError;

  fn try_from(limit: usize) -> Result<Self, Self::Error> {
    Concurrency::limited(limit)
  }
}

/// Optional pool settings. Every setter consumes and returns the options.
#[derive(Debug, Clone)]
pub struct PoolOptions {
  pub(crate) name: String,
  pub(crate) reject_on_error: bool,
  pub(crate) auto_start: bool,
  pub(crate) diagnostics: Diagnostics,
  pub(crate) runtime: Option<TokioHandle>,
}

impl Default for PoolOptions {
  fn default() -> Self {
    Self {
      name: "pool".to_string(),
      reject_on_error: false,
      auto_start: true,
      diagnostics: Diagnostics::Silent,
      runtime: None,
    }
  }
}

impl PoolOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Label used in diagnostics and tracing fields.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Fail fast: the first task failure rejects the pool's result.
  pub fn reject_on_error(mut self, reject_on_error: bool) -> Self {
    self.reject_on_error = reject_on_error;
    self
  }

  /// Whether the first `enqueue` implicitly starts the pool.
  pub fn auto_start(mut self, auto_start: bool) -> Self {
    self.auto_start = auto_start;
    self
  }

  /// Shorthand for the default `tracing` sink (`true`) or silence (`false`).
  pub fn verbose(mut self, verbose: bool) -> Self {
    self.diagnostics = Diagnostics::from_verbose(verbose);
    self
  }

  pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
    self.diagnostics = diagnostics;
    self
  }

  /// Installs a callback as the diagnostics sink.
  pub fn diagnostics_sink(self, sink: impl Fn(Severity, &str) + Send + Sync + 'static) -> Self {
    self.diagnostics(Diagnostics::sink(sink))
  }

  /// Runtime the pool spawns its tasks on. Defaults to the runtime current at
  /// construction.
  pub fn runtime(mut self, handle: TokioHandle) -> Self {
    self.runtime = Some(handle);
    self
  }

  pub(crate) fn resolve_runtime(&self) -> Result<TokioHandle, PoolError> {
    match &self.runtime {
      Some(handle) => Ok(handle.clone()),
      None => TokioHandle::try_current().map_err(|_| PoolError::NoRuntime),
    }
  }
}
