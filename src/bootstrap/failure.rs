//! Single-assignment slot for the first failure seen by concurrent siblings

use std::sync::{Mutex, PoisonError};

/// Holds the first error recorded; later errors are dropped
///
/// Only the existence of a failure plus one illustrative cause is needed by
/// callers, so this is a set-if-empty slot rather than a collection.
#[derive(Debug)]
pub struct FirstFailure<E> {
    slot: Mutex<Option<E>>,
}

impl<E> Default for FirstFailure<E> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<E> FirstFailure<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err` if the slot is empty; returns true if it was stored
    pub fn record(&self, err: E) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(err);
        true
    }

    pub fn into_inner(self) -> Option<E> {
        self.slot
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
