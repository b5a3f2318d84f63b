//! Threads and the native backends behind every primitive
//!
//! A [`ThreadBackend`] bundles three raw primitives for one native threading
//! API: an exclusive lock ([`RawMutex`]), a condition variable that waits on
//! that lock ([`RawCondvar`]) and a joinable OS thread ([`RawThread`]). The
//! public [`Mutex`](crate::sync::Mutex),
//! [`ConditionVariable`](crate::sync::ConditionVariable) and [`Thread`] types
//! are generic over the backend, with [`DefaultBackend`] picked per platform.
//!
//! Available backends:
//! - [`FutexBackend`] (Linux): futex words driven by direct syscalls
//! - [`PthreadBackend`] (Unix): `pthread_mutex_t`, `pthread_cond_t`, `pthread_create`
//! - [`ParkingBackend`] (everywhere): parking-lot queues keyed by address

#[cfg(target_os = "linux")]
pub mod linux_futex;

#[cfg(unix)]
pub mod pthread;

pub mod handle;
pub mod parking;

#[cfg(target_os = "linux")]
pub use linux_futex::{FutexBackend, FutexCondvar, FutexMutex};
#[cfg(unix)]
pub use pthread::{PthreadBackend, PthreadCondvar, PthreadMutex, PthreadThread};

pub use handle::{exit, Thread, ThreadProbe, ThreadState};
pub use parking::{ParkingBackend, ParkingCondvar, ParkingMutex};

use crate::error::{Result, ThreadError};

#[cfg(test)]
mod simple_tests;

/// Entry point handed to a backend; it never unwinds.
pub type RawEntry = Box<dyn FnOnce() + Send + 'static>;

/// Native exclusive lock
///
/// # Safety
///
/// Implementors must guarantee that between a successful `lock` and the
/// matching `unlock` no other thread returns from `lock`, and that `unlock`
/// followed by another thread's `lock` establishes happens-before.
pub unsafe trait RawMutex: Send + Sync + Sized {
    /// Allocate and prepare the native lock
    fn create() -> Result<Self>;

    /// Block until the lock is held by the calling thread
    fn lock(&self) -> Result<()>;

    /// Release the lock
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock.
    unsafe fn unlock(&self) -> Result<()>;

    /// Release native resources. Nobody may hold or wait on the lock.
    fn destroy(self) -> Result<()>;
}

/// Native condition variable bound to the backend's mutex type
///
/// # Safety
///
/// `wait` must release the mutex and enqueue the caller as one step with
/// respect to `signal`: a `signal` issued after the mutex was released must
/// wake the waiter (or a later one). A `signal` with no waiter must not be
/// stored for future waiters beyond what a spurious wakeup would allow.
pub unsafe trait RawCondvar<M: RawMutex>: Send + Sync + Sized {
    /// Allocate and prepare the native condition variable
    fn create() -> Result<Self>;

    /// Release `mutex`, block until signalled, re-acquire `mutex`
    ///
    /// On `Ok` the mutex is held again; on `Err` it is not held.
    ///
    /// # Safety
    ///
    /// The calling thread must hold `mutex`.
    unsafe fn wait(&self, mutex: &M) -> Result<()>;

    /// Wake at most one waiter
    fn signal(&self) -> Result<()>;

    /// Release native resources. Nobody may wait on the condition variable.
    fn destroy(self) -> Result<()>;
}

/// Native joinable thread
pub trait RawThread: Send + Sized {
    /// Block until the thread has terminated and release its resources
    fn join(self) -> Result<()>;
}

/// One native threading API
pub trait ThreadBackend: Send + Sync + 'static {
    /// Exclusive lock
    type Mutex: RawMutex;
    /// Condition variable waiting on [`Self::Mutex`]
    type Condvar: RawCondvar<Self::Mutex>;
    /// Joinable thread
    type Thread: RawThread;

    /// Short name used in logs and errors
    const NAME: &'static str;

    /// Whether a `signal` racing with a `wait` that has already released the
    /// mutex is always delivered. Condition variables refuse to initialize on
    /// backends that cannot promise this.
    const WAKEUP_SAFE: bool = true;

    /// Start a new thread running `entry`
    fn spawn(name: Option<&str>, stack_size: Option<usize>, entry: RawEntry) -> Result<Self::Thread>;
}

/// Backend selected for this platform
#[cfg(target_os = "linux")]
pub type DefaultBackend = linux_futex::FutexBackend;

/// Backend selected for this platform
#[cfg(not(target_os = "linux"))]
pub type DefaultBackend = parking::ParkingBackend;

/// Thread started through `std::thread::Builder`
#[derive(Debug)]
pub struct StdThread {
    backend: &'static str,
    handle: std::thread::JoinHandle<()>,
}

impl RawThread for StdThread {
    fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| ThreadError::backend_failure(self.backend, "join", "entry unwound past the backend"))
    }
}

/// Spawn helper shared by the backends that use std threads
pub(crate) fn spawn_std(
    backend: &'static str,
    name: Option<&str>,
    stack_size: Option<usize>,
    entry: RawEntry,
) -> Result<StdThread> {
    let mut builder = std::thread::Builder::new();
    if let Some(name) = name {
        builder = builder.name(name.to_owned());
    }
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    let handle = builder
        .spawn(entry)
        .map_err(|e| ThreadError::from_io(backend, "spawn", &e))?;
    Ok(StdThread { backend, handle })
}
