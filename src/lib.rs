//! # unithread: Portable Threads and Synchronization Primitives
//!
//! One small, uniform API for creating and joining OS threads and for
//! coordinating them with a mutex and a condition variable, independent of the
//! native threading facility underneath.
//!
//! ## Key Features
//!
//! - **Explicit lifecycle**: primitives are constructed uninitialized, then
//!   `init`, used, and `destroy`ed; misuse is reported as an error
//! - **Guards as proof of ownership**: unlocking a mutex you do not hold cannot
//!   be expressed
//! - **No lost wakeups**: condition variables only run on backends that release
//!   the mutex and enqueue the waiter as one step
//! - **Typed threads**: the entry closure's return value comes back from `join`
//! - **Pluggable backends**: Linux futex, POSIX threads, and a portable
//!   parking-lot backend behind one trait
//! - **Lifecycle status codes**: a typed protocol for callers that track
//!   thread-object states
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use unithread::{Mutex, Thread};
//!
//! # fn main() -> unithread::Result<()> {
//! unithread::init();
//!
//! let mut mutex = Mutex::new();
//! mutex.init()?;
//! let mutex = Arc::new(mutex);
//!
//! let workers: Vec<_> = (0..4)
//!     .map(|i| {
//!         let mutex = Arc::clone(&mutex);
//!         Thread::create(Some(format!("worker-{}", i).as_str()), move || {
//!             let guard = mutex.lock()?;
//!             guard.unlock()?;
//!             Ok::<_, unithread::ThreadError>(i)
//!         })
//!     })
//!     .collect::<unithread::Result<_>>()?;
//!
//! for worker in workers {
//!     assert!(worker.join()?.is_some());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod status;
pub mod sync;
pub mod thread;

// Re-export core types
pub use config::{Config, ThreadConfig};
pub use error::{Result, ThreadError};
pub use status::{AtomicThreadStatus, StatusPhase, ThreadStatus};
pub use sync::{ConditionVariable, Mutex, MutexGuard};
pub use thread::{exit, DefaultBackend, Thread, ThreadBackend, ThreadProbe, ThreadState};

/// All backends available on this target
pub mod backends {
    #[cfg(target_os = "linux")]
    pub use crate::thread::FutexBackend;
    pub use crate::thread::ParkingBackend;
    #[cfg(unix)]
    pub use crate::thread::PthreadBackend;
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the backend used by `Mutex::new`, `ConditionVariable::new` and `Thread::create`
pub fn backend_name() -> &'static str {
    DefaultBackend::NAME
}

/// Initialize the library
///
/// Nothing needs setting up; this only logs which backend was selected.
pub fn init() {
    log::debug!("Initializing unithread v{} ({} backend)", VERSION, backend_name());
}
