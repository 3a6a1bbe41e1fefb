//! Abortable barrier shared by every member of a pool.
//!
//! A plain `std::sync::Barrier` cannot be cancelled, so a member stuck in it would outlive a
//! pool abort. `Rendezvous` counts arrivals per generation under a mutex and lets `abort`
//! wake every waiter, after which all waits fail with the recorded `FatalError`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::errors::{FatalError, FindError, FindResult};

#[derive(Debug, Default)]
struct RendezvousState {
    arrived: usize,
    generation: u64,
    fatal: Option<FatalError>,
}

#[derive(Debug)]
pub(crate) struct Rendezvous {
    parties: usize,
    state: Mutex<RendezvousState>,
    cvar: Condvar,
    aborted: AtomicBool,
}

impl Rendezvous {
    pub(crate) fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(RendezvousState::default()),
            cvar: Condvar::new(),
            aborted: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RendezvousState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until all parties have arrived or the pool is aborted
    pub(crate) fn wait(&self) -> FindResult<()> {
        let mut state = self.lock();
        if let Some(fatal) = &state.fatal {
            return Err(FindError::Aborted(fatal.clone()));
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            trace!(generation, "Rendezvous complete");
            self.cvar.notify_all();
            return Ok(());
        }

        while state.generation == generation {
            if let Some(fatal) = &state.fatal {
                return Err(FindError::Aborted(fatal.clone()));
            }
            state = self
                .cvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    /// Records `fatal` and wakes every waiter. Returns false if the pool was already aborted.
    pub(crate) fn abort(&self, fatal: FatalError) -> bool {
        let mut state = self.lock();
        if state.fatal.is_some() {
            return false;
        }
        state.fatal = Some(fatal);
        self.aborted.store(true, Ordering::SeqCst);
        self.cvar.notify_all();
        true
    }

    /// Cheap check for loops that do not block in `wait`
    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn fatal(&self) -> Option<FatalError> {
        self.lock().fatal.clone()
    }

    pub(crate) fn check(&self) -> FindResult<()> {
        if self.is_aborted() {
            if let Some(fatal) = self.fatal() {
                return Err(FindError::Aborted(fatal));
            }
        }
        Ok(())
    }
}
