use crate::error::PoolError;
use crate::task::Outcome;

use std::collections::HashMap;

/// Sparse, write-once store of task outcomes keyed by submission index.
#[derive(Debug)]
pub(crate) struct ResultSlots<T, E> {
  slots: HashMap<usize, Outcome<T, E>>,
}

impl<T, E> ResultSlots<T, E> {
  pub(crate) fn new() -> Self {
    Self { slots: HashMap::new() }
  }

  /// Records the outcome at `index`. A second write to the same index is
  /// refused and leaves the first outcome in place.
  pub(crate) fn set(&mut self, index: usize, outcome: Outcome<T, E>) -> Result<(), PoolError> {
    if self.slots.contains_key(&index) {
      return Err(PoolError::DuplicateOutcome(index));
    }
    self.slots.insert(index, outcome);
    Ok(())
  }

  pub(crate) fn clear(&mut self) {
    self.slots.clear();
  }

  /// Drains the store into a dense sequence covering indices `0..assigned`.
  ///
  /// Fails on the first index with no recorded outcome.
  pub(crate) fn finalize(&mut self, assigned: usize) -> Result<Vec<Outcome<T, E>>, PoolError> {
    if let Some(missing) = (0..assigned).find(|index| !self.slots.contains_key(index)) {
      return Err(PoolError::MissingOutcome(missing));
    }
    let mut ordered = Vec::with_capacity(assigned);
    for index in 0..assigned {
      if let Some(outcome) = self.slots.remove(&index) {
        ordered.push(outcome);
      }
    }
    Ok(ordered)
  }
}
