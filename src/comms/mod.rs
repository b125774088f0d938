pub mod channel;
pub mod queue;
pub mod tcp;

pub use channel::{SendOutcome, Transport};

use std::sync::{Mutex, MutexGuard};

/// Lock an endpoint mutex, recovering the guard if a previous holder panicked.
///
/// Endpoint state is a set of `Option` handles that are only ever taken
/// whole, so a poisoned lock never leaves them half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
