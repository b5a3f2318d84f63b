//! Exclusive lock with an explicit init/destroy lifecycle

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Result, ThreadError};
use crate::thread::{DefaultBackend, RawMutex, ThreadBackend};

const RESOURCE: &str = "mutex";

/// Exclusive, non-reentrant lock
///
/// A `Mutex` starts uninitialized. [`init`](Mutex::init) prepares the native
/// lock and [`destroy`](Mutex::destroy) releases it; both take `&mut self`,
/// so nobody can hold or wait on the lock while they run. The lock protects
/// whatever data the caller decides; it stores none itself.
///
/// ```rust
/// use unithread::Mutex;
/// # fn main() -> unithread::Result<()> {
/// let mut mutex = Mutex::new();
/// mutex.init()?;
/// let guard = mutex.lock()?;
/// guard.unlock()?;
/// mutex.destroy()?;
/// # Ok(())
/// # }
/// ```
pub struct Mutex<B: ThreadBackend = DefaultBackend> {
    raw: Option<B::Mutex>,
}

impl Mutex {
    /// Uninitialized mutex on the default backend
    pub const fn new() -> Self {
        Self { raw: None }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ThreadBackend> Mutex<B> {
    /// Uninitialized mutex on backend `B`
    pub const fn with_backend() -> Self {
        Self { raw: None }
    }

    /// Prepare the native lock
    pub fn init(&mut self) -> Result<()> {
        if self.raw.is_some() {
            return Err(ThreadError::already_initialized(RESOURCE));
        }
        self.raw = Some(B::Mutex::create()?);
        log::debug!("[{}] mutex initialized", B::NAME);
        Ok(())
    }

    /// Whether [`init`](Mutex::init) succeeded and no destroy happened since
    pub fn is_initialized(&self) -> bool {
        self.raw.is_some()
    }

    /// Name of the backend this mutex runs on
    pub fn backend_name(&self) -> &'static str {
        B::NAME
    }

    /// Block until the calling thread owns the lock
    pub fn lock(&self) -> Result<MutexGuard<'_, B>> {
        let raw = self.raw()?;
        raw.lock()?;
        Ok(MutexGuard { raw, _not_send: PhantomData })
    }

    /// Release native resources; the mutex may be initialized again later
    pub fn destroy(&mut self) -> Result<()> {
        let raw = self.raw.take().ok_or_else(|| ThreadError::not_initialized(RESOURCE))?;
        raw.destroy()?;
        log::debug!("[{}] mutex destroyed", B::NAME);
        Ok(())
    }

    fn raw(&self) -> Result<&B::Mutex> {
        self.raw.as_ref().ok_or_else(|| ThreadError::not_initialized(RESOURCE))
    }
}

impl<B: ThreadBackend> Drop for Mutex<B> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if let Err(e) = raw.destroy() {
                log::warn!("[{}] dropping mutex: {}", B::NAME, e);
            }
        }
    }
}

impl<B: ThreadBackend> fmt::Debug for Mutex<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("backend", &B::NAME)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Proof that the current thread holds a [`Mutex`]
///
/// Dropping the guard releases the lock; [`unlock`](MutexGuard::unlock) does
/// the same but reports native errors. The guard cannot leave its thread.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct MutexGuard<'a, B: ThreadBackend = DefaultBackend> {
    raw: &'a B::Mutex,
    _not_send: PhantomData<*const ()>,
}

impl<'a, B: ThreadBackend> MutexGuard<'a, B> {
    /// Release the lock
    pub fn unlock(self) -> Result<()> {
        let raw = self.raw;
        std::mem::forget(self);
        unsafe { raw.unlock() }
    }

    pub(crate) fn raw(&self) -> &'a B::Mutex {
        self.raw
    }

    /// Give up the guard without unlocking; the mutex is no longer held
    /// by this thread once a backend wait failed.
    pub(crate) fn disarm(self) {
        std::mem::forget(self);
    }
}

impl<B: ThreadBackend> Drop for MutexGuard<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.raw.unlock() } {
            log::warn!("[{}] releasing mutex guard: {}", B::NAME, e);
        }
    }
}

impl<B: ThreadBackend> fmt::Debug for MutexGuard<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard").field("backend", &B::NAME).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ParkingBackend;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lock_before_init() {
        let mutex = Mutex::new();
        assert!(!mutex.is_initialized());
        assert!(matches!(mutex.lock(), Err(ThreadError::NotInitialized { .. })));
    }

    #[test]
    fn test_double_init() {
        let mut mutex = Mutex::new();
        mutex.init().unwrap();
        assert!(matches!(mutex.init(), Err(ThreadError::AlreadyInitialized { .. })));
        assert!(mutex.is_initialized());
    }

    #[test]
    fn test_destroy_then_reinit() {
        let mut mutex = Mutex::<ParkingBackend>::with_backend();
        assert!(matches!(mutex.destroy(), Err(ThreadError::NotInitialized { .. })));
        mutex.init().unwrap();
        mutex.destroy().unwrap();
        assert!(matches!(mutex.lock(), Err(ThreadError::NotInitialized { .. })));
        mutex.init().unwrap();
        mutex.lock().unwrap().unlock().unwrap();
    }

    #[test]
    fn test_guard_drop_releases() {
        let mut mutex = Mutex::new();
        mutex.init().unwrap();
        {
            let _guard = mutex.lock().unwrap();
        }
        let guard = mutex.lock().unwrap();
        guard.unlock().unwrap();
    }

    #[test]
    fn test_mutex_contention() {
        let mut mutex = Mutex::new();
        mutex.init().unwrap();
        let mutex = Arc::new(mutex);
        let counter = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let counter = Arc::clone(&counter);

                thread::spawn(move || {
                    for _ in 0..100 {
                        let guard = mutex.lock().unwrap();
                        let old = counter.load(Ordering::Relaxed);
                        thread::sleep(Duration::from_nanos(1));
                        counter.store(old + 1, Ordering::Relaxed);
                        guard.unlock().unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn test_debug_output() {
        let mutex = Mutex::<ParkingBackend>::with_backend();
        let debug = format!("{:?}", mutex);
        assert!(debug.contains("parking"));
        assert!(debug.contains("initialized: false"));
        assert_eq!(mutex.backend_name(), "parking");
    }
}
