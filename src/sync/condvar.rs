//! Condition variable paired with [`Mutex`](super::Mutex)

use std::fmt;

use super::MutexGuard;
use crate::error::{Result, ThreadError};
use crate::thread::{DefaultBackend, RawCondvar, ThreadBackend};

const RESOURCE: &str = "condition variable";

/// Wait/signal primitive used together with a [`Mutex`](super::Mutex)
///
/// `wait` releases the mutex and blocks as one step with respect to
/// `signal`, so a signal sent after the waiter checked its predicate under
/// the mutex is never lost. `signal` wakes at most one waiter and is a no-op
/// when nobody waits. Waits may also end spuriously; callers re-check their
/// predicate in a loop or use [`wait_while`](ConditionVariable::wait_while).
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use unithread::{ConditionVariable, Mutex, Thread};
/// # fn main() -> unithread::Result<()> {
/// let mut mutex = Mutex::new();
/// mutex.init()?;
/// let mut cond = ConditionVariable::new();
/// cond.init()?;
/// let shared = Arc::new((mutex, cond, AtomicBool::new(false)));
///
/// let producer = {
///     let shared = Arc::clone(&shared);
///     Thread::create(Some("producer"), move || -> unithread::Result<()> {
///         let (mutex, cond, ready) = &*shared;
///         let guard = mutex.lock()?;
///         ready.store(true, Ordering::Relaxed);
///         guard.unlock()?;
///         cond.signal()
///     })?
/// };
///
/// let (mutex, cond, ready) = &*shared;
/// let guard = cond.wait_while(mutex.lock()?, || !ready.load(Ordering::Relaxed))?;
/// guard.unlock()?;
/// producer.join()?.unwrap()?;
/// # Ok(())
/// # }
/// ```
pub struct ConditionVariable<B: ThreadBackend = DefaultBackend> {
    raw: Option<B::Condvar>,
}

impl ConditionVariable {
    /// Uninitialized condition variable on the default backend
    pub const fn new() -> Self {
        Self { raw: None }
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ThreadBackend> ConditionVariable<B> {
    /// Uninitialized condition variable on backend `B`
    pub const fn with_backend() -> Self {
        Self { raw: None }
    }

    /// Prepare the native condition variable
    ///
    /// Fails with `BackendFailure` on a backend that cannot guarantee that a
    /// signal racing with a wait is delivered.
    pub fn init(&mut self) -> Result<()> {
        if self.raw.is_some() {
            return Err(ThreadError::already_initialized(RESOURCE));
        }
        if !B::WAKEUP_SAFE {
            return Err(ThreadError::backend_failure(
                B::NAME,
                "cond_init",
                "backend can lose a signal that races with wait",
            ));
        }
        self.raw = Some(B::Condvar::create()?);
        log::debug!("[{}] condition variable initialized", B::NAME);
        Ok(())
    }

    /// Whether [`init`](ConditionVariable::init) succeeded and no destroy happened since
    pub fn is_initialized(&self) -> bool {
        self.raw.is_some()
    }

    /// Release the mutex held by `guard`, block until signalled, re-acquire it
    ///
    /// On error the guard is consumed and the mutex is not held.
    pub fn wait<'a>(&self, guard: MutexGuard<'a, B>) -> Result<MutexGuard<'a, B>> {
        let raw = self.raw()?;
        match unsafe { raw.wait(guard.raw()) } {
            Ok(()) => Ok(guard),
            Err(e) => {
                guard.disarm();
                Err(e)
            }
        }
    }

    /// Wait until `condition` returns false, re-checking after every wakeup
    pub fn wait_while<'a, F>(&self, mut guard: MutexGuard<'a, B>, mut condition: F) -> Result<MutexGuard<'a, B>>
    where
        F: FnMut() -> bool,
    {
        while condition() {
            guard = self.wait(guard)?;
        }
        Ok(guard)
    }

    /// Wake at most one waiting thread
    pub fn signal(&self) -> Result<()> {
        self.raw()?.signal()
    }

    /// Release native resources; the condition variable may be initialized again later
    pub fn destroy(&mut self) -> Result<()> {
        let raw = self.raw.take().ok_or_else(|| ThreadError::not_initialized(RESOURCE))?;
        raw.destroy()?;
        log::debug!("[{}] condition variable destroyed", B::NAME);
        Ok(())
    }

    fn raw(&self) -> Result<&B::Condvar> {
        self.raw.as_ref().ok_or_else(|| ThreadError::not_initialized(RESOURCE))
    }
}

impl<B: ThreadBackend> Drop for ConditionVariable<B> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if let Err(e) = raw.destroy() {
                log::warn!("[{}] dropping condition variable: {}", B::NAME, e);
            }
        }
    }
}

impl<B: ThreadBackend> fmt::Debug for ConditionVariable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("backend", &B::NAME)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Mutex;
    use crate::thread::{ParkingBackend, RawEntry, StdThread};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Parking primitives, but declared unable to deliver racing signals
    struct LossyBackend;

    impl ThreadBackend for LossyBackend {
        type Mutex = <ParkingBackend as ThreadBackend>::Mutex;
        type Condvar = <ParkingBackend as ThreadBackend>::Condvar;
        type Thread = StdThread;

        const NAME: &'static str = "lossy";
        const WAKEUP_SAFE: bool = false;

        fn spawn(name: Option<&str>, stack_size: Option<usize>, entry: RawEntry) -> Result<StdThread> {
            ParkingBackend::spawn(name, stack_size, entry)
        }
    }

    #[test]
    fn test_init_lifecycle() {
        let mut cond = ConditionVariable::new();
        assert!(matches!(cond.signal(), Err(ThreadError::NotInitialized { .. })));
        cond.init().unwrap();
        assert!(matches!(cond.init(), Err(ThreadError::AlreadyInitialized { .. })));
        cond.signal().unwrap();
        cond.destroy().unwrap();
        assert!(matches!(cond.destroy(), Err(ThreadError::NotInitialized { .. })));
        cond.init().unwrap();
    }

    #[test]
    fn test_wait_requires_init() {
        let mut mutex = Mutex::new();
        mutex.init().unwrap();
        let cond = ConditionVariable::new();

        let guard = mutex.lock().unwrap();
        assert!(matches!(cond.wait(guard), Err(ThreadError::NotInitialized { .. })));
        // the failed wait released the mutex
        mutex.lock().unwrap().unlock().unwrap();
    }

    #[test]
    fn test_lossy_backend_is_rejected() {
        let mut cond = ConditionVariable::<LossyBackend>::with_backend();
        match cond.init() {
            Err(ThreadError::BackendFailure { backend, operation, .. }) => {
                assert_eq!(backend, "lossy");
                assert_eq!(operation, "cond_init");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!cond.is_initialized());

        // the lossy backend still offers a working mutex
        let mut mutex = Mutex::<LossyBackend>::with_backend();
        mutex.init().unwrap();
        mutex.lock().unwrap().unlock().unwrap();
    }

    #[test]
    fn test_wait_while_with_signal() {
        let mut mutex = Mutex::<ParkingBackend>::with_backend();
        mutex.init().unwrap();
        let mut cond = ConditionVariable::<ParkingBackend>::with_backend();
        cond.init().unwrap();
        let shared = Arc::new((mutex, cond, AtomicBool::new(false)));

        let signaller = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                let (mutex, cond, flag) = &*shared;
                let guard = mutex.lock().unwrap();
                flag.store(true, Ordering::Relaxed);
                drop(guard);
                cond.signal().unwrap();
            })
        };

        let (mutex, cond, flag) = &*shared;
        let guard = cond
            .wait_while(mutex.lock().unwrap(), || !flag.load(Ordering::Relaxed))
            .unwrap();
        assert!(flag.load(Ordering::Relaxed));
        guard.unlock().unwrap();
        signaller.join().unwrap();
    }
}
