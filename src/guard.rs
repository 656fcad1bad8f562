//! Transition guard
//!
//! Every mutating entry point runs inside one `Transition`: transitions on
//! the ledger are serialized, and a call that re-enters the engine from the
//! thread already running a transition (e.g. from inside a transfer hook)
//! is rejected instead of deadlocking or observing half-applied state.

use crate::errors::BetError;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

pub struct TransitionGuard<T> {
    state: Mutex<T>,
    holder: Mutex<Option<ThreadId>>,
}

impl<T> TransitionGuard<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            holder: Mutex::new(None),
        }
    }

    fn holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a transition, waiting for any transition on another thread
    pub fn enter(&self) -> Result<Transition<'_, T>, BetError> {
        let me = thread::current().id();
        if *self.holder() == Some(me) {
            return Err(BetError::Reentrancy);
        }

        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *self.holder() = Some(me);
        Ok(Transition {
            state,
            guard: self,
        })
    }

    /// Runs a read-only closure against the current state
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, BetError> {
        let transition = self.enter()?;
        Ok(f(&*transition))
    }
}

/// Exclusive access to the state for the length of one transition
pub struct Transition<'a, T> {
    state: MutexGuard<'a, T>,
    guard: &'a TransitionGuard<T>,
}

impl<T> Deref for Transition<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

impl<T> DerefMut for Transition<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.state
    }
}

impl<T> Drop for Transition<'_, T> {
    fn drop(&mut self) {
        *self.guard.holder() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reentry_on_same_thread_rejected() {
        let guard = TransitionGuard::new(0u32);
        let outer = guard.enter().unwrap();
        assert_eq!(guard.enter().err(), Some(BetError::Reentrancy));
        assert_eq!(guard.read(|v| *v).err(), Some(BetError::Reentrancy));
        drop(outer);
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_transitions_serialize_across_threads() {
        let guard = Arc::new(TransitionGuard::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let mut state = guard.enter().unwrap();
                        let current = *state;
                        *state = current + 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(guard.read(|v| *v).unwrap(), 8_000);
    }
}
