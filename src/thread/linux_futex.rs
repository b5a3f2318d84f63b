//! Linux Futex Backend
//!
//! Mutex and condition variable built on futex words with direct syscalls.
//! Threads are plain std threads.

use std::sync::atomic::{AtomicU32, Ordering};

use super::{spawn_std, RawCondvar, RawEntry, RawMutex, StdThread, ThreadBackend};
use crate::error::{Result, ThreadError};

const BACKEND: &str = "futex";

mod sys {
    use libc::{syscall, SYS_futex};
    use std::ffi::c_int;
    use std::ptr;

    pub const FUTEX_WAIT_PRIVATE: c_int = 128;
    pub const FUTEX_WAKE_PRIVATE: c_int = 129;

    /// Block while `*uaddr == val`
    #[inline]
    pub unsafe fn futex_wait(uaddr: *const u32, val: u32) -> c_int {
        unsafe {
            syscall(
                SYS_futex,
                uaddr as usize,
                FUTEX_WAIT_PRIVATE as usize,
                val as usize,
                ptr::null::<libc::timespec>() as usize,
                0usize,
                0usize,
            ) as c_int
        }
    }

    /// Wake up to `count` waiters on `uaddr`
    #[inline]
    pub unsafe fn futex_wake(uaddr: *const u32, count: u32) -> c_int {
        unsafe {
            syscall(
                SYS_futex,
                uaddr as usize,
                FUTEX_WAKE_PRIVATE as usize,
                count as usize,
                0usize,
                0usize,
                0usize,
            ) as c_int
        }
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Block while `addr` still holds `val`. Spurious returns are allowed.
fn futex_wait(addr: &AtomicU32, val: u32) -> Result<()> {
    let result = unsafe { sys::futex_wait(addr.as_ptr(), val) };
    if result == -1 {
        match last_errno() {
            libc::EAGAIN => Ok(()), // Value changed before wait
            libc::EINTR => Ok(()),  // Interrupted by signal
            errno => Err(ThreadError::from_errno(BACKEND, "futex_wait", errno)),
        }
    } else {
        Ok(())
    }
}

/// Wake up to `count` waiters, returning how many were woken
fn futex_wake(addr: &AtomicU32, count: u32) -> Result<usize> {
    let result = unsafe { sys::futex_wake(addr.as_ptr(), count) };
    if result == -1 {
        Err(ThreadError::from_errno(BACKEND, "futex_wake", last_errno()))
    } else {
        Ok(result as usize)
    }
}

/// Futex-based threading backend
#[derive(Debug)]
pub struct FutexBackend;

impl ThreadBackend for FutexBackend {
    type Mutex = FutexMutex;
    type Condvar = FutexCondvar;
    type Thread = StdThread;

    const NAME: &'static str = BACKEND;

    fn spawn(name: Option<&str>, stack_size: Option<usize>, entry: RawEntry) -> Result<StdThread> {
        spawn_std(BACKEND, name, stack_size, entry)
    }
}

/// Exclusive lock on a single futex word
#[derive(Debug)]
pub struct FutexMutex {
    /// State: 0 = unlocked, 1 = locked (no waiters), 2 = locked (with waiters)
    state: AtomicU32,
}

impl FutexMutex {
    /// Slow path for contended lock
    fn lock_slow(&self) -> Result<()> {
        loop {
            // Set state to 2 (locked with waiters)
            let state = self.state.swap(2, Ordering::Acquire);
            if state == 0 {
                return Ok(());
            }
            futex_wait(&self.state, 2)?;
        }
    }
}

// SAFETY: the 0/1/2 protocol lets exactly one thread move the word away from
// 0 at a time; acquisition uses Acquire and release uses Release ordering.
unsafe impl RawMutex for FutexMutex {
    fn create() -> Result<Self> {
        Ok(Self { state: AtomicU32::new(0) })
    }

    fn lock(&self) -> Result<()> {
        if self
            .state
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Ok(());
        }
        self.lock_slow()
    }

    unsafe fn unlock(&self) -> Result<()> {
        if self.state.swap(0, Ordering::Release) == 2 {
            // There were waiters, wake one
            futex_wake(&self.state, 1)?;
        }
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}

/// Condition variable on a futex sequence counter
///
/// `signal` bumps the counter before waking. `wait` samples the counter while
/// the mutex is still held, so a signal that lands between the unlock and the
/// futex call changes the word and the kernel refuses to sleep.
#[derive(Debug)]
pub struct FutexCondvar {
    futex: AtomicU32,
}

// SAFETY: the counter is sampled under the mutex and FUTEX_WAIT compares it
// atomically with enqueueing, so no signal after the unlock is lost.
unsafe impl RawCondvar<FutexMutex> for FutexCondvar {
    fn create() -> Result<Self> {
        Ok(Self { futex: AtomicU32::new(0) })
    }

    unsafe fn wait(&self, mutex: &FutexMutex) -> Result<()> {
        let futex_val = self.futex.load(Ordering::Relaxed);

        unsafe { mutex.unlock()? };
        let waited = futex_wait(&self.futex, futex_val);
        mutex.lock()?;

        if let Err(e) = waited {
            unsafe { mutex.unlock()? };
            return Err(e);
        }
        Ok(())
    }

    fn signal(&self) -> Result<()> {
        self.futex.fetch_add(1, Ordering::Relaxed);
        futex_wake(&self.futex, 1)?;
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::RawThread;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_futex_mutex_basic() {
        let mutex = FutexMutex::create().unwrap();
        mutex.lock().unwrap();
        unsafe { mutex.unlock().unwrap() };
        mutex.lock().unwrap();
        unsafe { mutex.unlock().unwrap() };
        mutex.destroy().unwrap();
    }

    #[test]
    fn test_futex_mutex_contention() {
        let mutex = Arc::new(FutexMutex::create().unwrap());
        let counter = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let counter = Arc::clone(&counter);

                thread::spawn(move || {
                    for _ in 0..100 {
                        mutex.lock().unwrap();
                        let old = counter.load(Ordering::Relaxed);
                        thread::sleep(Duration::from_nanos(1));
                        counter.store(old + 1, Ordering::Relaxed);
                        unsafe { mutex.unlock().unwrap() };
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
    fn test_futex_condvar() {
        let mutex = Arc::new(FutexMutex::create().unwrap());
        let condvar = Arc::new(FutexCondvar::create().unwrap());
        let ready = Arc::new(AtomicU32::new(0));

        let mutex_clone = Arc::clone(&mutex);
        let condvar_clone = Arc::clone(&condvar);
        let ready_clone = Arc::clone(&ready);

        let handle = thread::spawn(move || {
            mutex_clone.lock().unwrap();
            while ready_clone.load(Ordering::Relaxed) == 0 {
                unsafe { condvar_clone.wait(&mutex_clone).unwrap() };
            }
            unsafe { mutex_clone.unlock().unwrap() };
        });

        thread::sleep(Duration::from_millis(10));
        mutex.lock().unwrap();
        ready.store(1, Ordering::Relaxed);
        unsafe { mutex.unlock().unwrap() };
        condvar.signal().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_signal_without_waiters_only_bumps_counter() {
        let condvar = FutexCondvar::create().unwrap();
        condvar.signal().unwrap();
        condvar.signal().unwrap();
        assert_eq!(condvar.futex.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_spawn_and_join() {
        let flag = Arc::new(AtomicU32::new(0));
        let flag_clone = Arc::clone(&flag);
        let thread = FutexBackend::spawn(
            Some("futex-worker"),
            None,
            Box::new(move || {
                assert_eq!(thread::current().name(), Some("futex-worker"));
                flag_clone.store(7, Ordering::Release);
            }),
        )
        .unwrap();
        thread.join().unwrap();
        assert_eq!(flag.load(Ordering::Acquire), 7);
    }
}
