//! Mutex and condition variable
//!
//! Both primitives follow the same lifecycle: construct uninitialized,
//! `init`, use any number of times, `destroy`. Using a handle outside that
//! window yields [`NotInitialized`](crate::ThreadError::NotInitialized).
//! Dropping an initialized handle destroys it.

pub mod condvar;
pub mod mutex;

pub use condvar::ConditionVariable;
pub use mutex::{Mutex, MutexGuard};
