//! Portable parking-lot backend
//!
//! The mutex is `parking_lot::RawMutex`. The condition variable parks waiters
//! in the global parking lot keyed by its own address: a waiter is queued
//! under the bucket lock *before* the mutex is released, so `signal`
//! (which takes the same bucket lock) can never miss it.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::lock_api::RawMutex as _;
use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

use super::{spawn_std, RawCondvar, RawEntry, RawMutex, StdThread, ThreadBackend};
use crate::error::Result;

const BACKEND: &str = "parking";

/// Backend available on every platform
#[derive(Debug)]
pub struct ParkingBackend;

impl ThreadBackend for ParkingBackend {
    type Mutex = ParkingMutex;
    type Condvar = ParkingCondvar;
    type Thread = StdThread;

    const NAME: &'static str = BACKEND;

    fn spawn(name: Option<&str>, stack_size: Option<usize>, entry: RawEntry) -> Result<StdThread> {
        spawn_std(BACKEND, name, stack_size, entry)
    }
}

/// Word-sized lock from `parking_lot`
pub struct ParkingMutex {
    raw: parking_lot::RawMutex,
}

impl std::fmt::Debug for ParkingMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParkingMutex")
            .field("locked", &self.raw.is_locked())
            .finish()
    }
}

// SAFETY: delegates to parking_lot::RawMutex, which upholds the lock_api
// RawMutex contract.
unsafe impl RawMutex for ParkingMutex {
    fn create() -> Result<Self> {
        Ok(Self { raw: parking_lot::RawMutex::INIT })
    }

    fn lock(&self) -> Result<()> {
        self.raw.lock();
        Ok(())
    }

    unsafe fn unlock(&self) -> Result<()> {
        unsafe { self.raw.unlock() };
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}

/// Condition variable parked on its own address
#[derive(Debug)]
pub struct ParkingCondvar {
    /// Threads currently parked; only changed under the bucket lock
    waiters: AtomicUsize,
}

impl ParkingCondvar {
    #[inline]
    fn key(&self) -> usize {
        &self.waiters as *const AtomicUsize as usize
    }
}

// SAFETY: the waiter is queued in `validate` under the bucket lock and the
// mutex is released only afterwards in `before_sleep`; `signal` dequeues
// under the same bucket lock.
unsafe impl RawCondvar<ParkingMutex> for ParkingCondvar {
    fn create() -> Result<Self> {
        Ok(Self { waiters: AtomicUsize::new(0) })
    }

    unsafe fn wait(&self, mutex: &ParkingMutex) -> Result<()> {
        let key = self.key();
        unsafe {
            parking_lot_core::park(
                key,
                || {
                    self.waiters.fetch_add(1, Ordering::Relaxed);
                    true
                },
                || {
                    // queued already, safe to let the signaller in
                    mutex.raw.unlock();
                },
                |_, _| {},
                DEFAULT_PARK_TOKEN,
                None,
            );
        }
        mutex.lock()
    }

    fn signal(&self) -> Result<()> {
        // The waiter bumps the count before it releases the mutex, so anyone
        // who changed the predicate under that mutex sees it.
        if self.waiters.load(Ordering::Relaxed) == 0 {
            return Ok(());
        }
        unsafe {
            parking_lot_core::unpark_one(self.key(), |result| {
                if result.unparked_threads != 0 {
                    self.waiters.fetch_sub(1, Ordering::Relaxed);
                }
                DEFAULT_UNPARK_TOKEN
            });
        }
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}
