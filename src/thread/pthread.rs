//! POSIX threads backend
//!
//! Native `pthread_mutex_t` / `pthread_cond_t` objects live in boxes so they
//! never move after `pthread_*_init`. Threads are started with
//! `pthread_create` through an `extern "C"` trampoline.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::mem::{self, MaybeUninit};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use super::{RawCondvar, RawEntry, RawMutex, RawThread, ThreadBackend};
use crate::error::{Result, ThreadError};

const BACKEND: &str = "pthread";

fn check(operation: &'static str, rc: libc::c_int) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(ThreadError::from_errno(BACKEND, operation, rc))
    }
}

/// POSIX threads backend
#[derive(Debug)]
pub struct PthreadBackend;

impl ThreadBackend for PthreadBackend {
    type Mutex = PthreadMutex;
    type Condvar = PthreadCondvar;
    type Thread = PthreadThread;

    const NAME: &'static str = BACKEND;

    fn spawn(name: Option<&str>, stack_size: Option<usize>, entry: RawEntry) -> Result<PthreadThread> {
        PthreadThread::spawn(name, stack_size, entry)
    }
}

/// Boxed `pthread_mutex_t` with default attributes
pub struct PthreadMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

impl PthreadMutex {
    #[inline]
    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl std::fmt::Debug for PthreadMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PthreadMutex").field("addr", &self.raw()).finish()
    }
}

// SAFETY: pthread mutexes are designed to be shared between threads; the
// box keeps the address stable.
unsafe impl Send for PthreadMutex {}
unsafe impl Sync for PthreadMutex {}

// SAFETY: pthread_mutex_lock/unlock provide mutual exclusion and the
// required memory synchronization (POSIX 4.12).
unsafe impl RawMutex for PthreadMutex {
    fn create() -> Result<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        check("mutex_init", unsafe { libc::pthread_mutex_init(inner.get(), ptr::null()) })?;
        Ok(Self { inner })
    }

    fn lock(&self) -> Result<()> {
        check("mutex_lock", unsafe { libc::pthread_mutex_lock(self.raw()) })
    }

    unsafe fn unlock(&self) -> Result<()> {
        check("mutex_unlock", unsafe { libc::pthread_mutex_unlock(self.raw()) })
    }

    fn destroy(self) -> Result<()> {
        check("mutex_destroy", unsafe { libc::pthread_mutex_destroy(self.raw()) })
    }
}

/// Boxed `pthread_cond_t` with default attributes
pub struct PthreadCondvar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

impl PthreadCondvar {
    #[inline]
    fn raw(&self) -> *mut libc::pthread_cond_t {
        self.inner.get()
    }
}

impl std::fmt::Debug for PthreadCondvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PthreadCondvar").field("addr", &self.raw()).finish()
    }
}

// SAFETY: see PthreadMutex.
unsafe impl Send for PthreadCondvar {}
unsafe impl Sync for PthreadCondvar {}

// SAFETY: pthread_cond_wait releases the mutex and blocks atomically with
// respect to pthread_cond_signal.
unsafe impl RawCondvar<PthreadMutex> for PthreadCondvar {
    fn create() -> Result<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        check("cond_init", unsafe { libc::pthread_cond_init(inner.get(), ptr::null()) })?;
        Ok(Self { inner })
    }

    unsafe fn wait(&self, mutex: &PthreadMutex) -> Result<()> {
        let rc = unsafe { libc::pthread_cond_wait(self.raw(), mutex.raw()) };
        if rc != 0 {
            // a failed pthread_cond_wait returns with the mutex still held
            unsafe { mutex.unlock()? };
            return check("cond_wait", rc);
        }
        Ok(())
    }

    fn signal(&self) -> Result<()> {
        check("cond_signal", unsafe { libc::pthread_cond_signal(self.raw()) })
    }

    fn destroy(self) -> Result<()> {
        check("cond_destroy", unsafe { libc::pthread_cond_destroy(self.raw()) })
    }
}

/// Thread started with `pthread_create`
///
/// Dropping the handle without joining detaches the thread, so its stack is
/// reclaimed when it terminates.
#[derive(Debug)]
pub struct PthreadThread {
    id: libc::pthread_t,
}

// SAFETY: a pthread_t may be joined from any thread.
unsafe impl Send for PthreadThread {}

extern "C" fn trampoline(arg: *mut c_void) -> *mut c_void {
    let entry = unsafe { Box::from_raw(arg as *mut RawEntry) };
    // unwinding into C is undefined
    if panic::catch_unwind(AssertUnwindSafe(move || entry())).is_err() {
        std::process::abort();
    }
    ptr::null_mut()
}

impl PthreadThread {
    fn spawn(name: Option<&str>, stack_size: Option<usize>, entry: RawEntry) -> Result<Self> {
        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        check("attr_init", unsafe { libc::pthread_attr_init(attr.as_mut_ptr()) })?;

        let result = (|| {
            if let Some(size) = stack_size {
                check("attr_setstacksize", unsafe {
                    libc::pthread_attr_setstacksize(attr.as_mut_ptr(), size)
                })?;
            }

            let arg = Box::into_raw(Box::new(entry)) as *mut c_void;
            let mut id = MaybeUninit::<libc::pthread_t>::uninit();
            let rc = unsafe { libc::pthread_create(id.as_mut_ptr(), attr.as_ptr(), trampoline, arg) };
            if rc != 0 {
                // the thread never started, reclaim the closure
                drop(unsafe { Box::from_raw(arg as *mut RawEntry) });
                return Err(ThreadError::from_errno(BACKEND, "create", rc));
            }
            Ok(unsafe { id.assume_init() })
        })();

        unsafe { libc::pthread_attr_destroy(attr.as_mut_ptr()) };
        let id = result?;

        if let Some(name) = name {
            set_native_name(id, name);
        }
        Ok(Self { id })
    }

    /// Let the thread run on without a handle; its resources are released
    /// when it terminates.
    pub fn detach(self) -> Result<()> {
        let id = self.into_id();
        check("detach", unsafe { libc::pthread_detach(id) })
    }

    /// Take the id out without running `Drop`
    fn into_id(self) -> libc::pthread_t {
        let id = self.id;
        mem::forget(self);
        id
    }
}

#[cfg(target_os = "linux")]
fn set_native_name(id: libc::pthread_t, name: &str) {
    // Linux limits names to 15 bytes plus NUL
    let mut end = name.len().min(15);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    if let Ok(cname) = std::ffi::CString::new(&name[..end]) {
        let rc = unsafe { libc::pthread_setname_np(id, cname.as_ptr()) };
        if rc != 0 {
            log::trace!("pthread_setname_np({}) failed: {}", name, rc);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_native_name(_id: libc::pthread_t, _name: &str) {}

impl RawThread for PthreadThread {
    fn join(self) -> Result<()> {
        let id = self.into_id();
        check("join", unsafe { libc::pthread_join(id, ptr::null_mut()) })
    }
}

impl Drop for PthreadThread {
    fn drop(&mut self) {
        let rc = unsafe { libc::pthread_detach(self.id) };
        if rc != 0 {
            let err = ThreadError::from_errno(BACKEND, "detach", rc);
            log::warn!("[{}] detaching dropped thread: {}", BACKEND, err);
        }
    }
}
