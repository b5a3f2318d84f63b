//! Thread handles
//!
//! [`Thread`] wraps a backend thread together with the outcome of its entry
//! closure. The closure replaces the classic "entry procedure plus opaque
//! argument" pair: whatever state the thread needs is captured by value and
//! whatever it produces comes back from [`Thread::join`].
//!
//! [`exit`] ends the calling thread early. It unwinds to the top of the
//! thread with a private payload, so guards and other values on the way are
//! dropped normally; the unwind is caught before it reaches the backend.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SlotLock;

use super::{DefaultBackend, RawThread, ThreadBackend};
use crate::config::{Config, ThreadConfig};
use crate::error::{Result, ThreadError};

thread_local! {
    static MANAGED: Cell<bool> = const { Cell::new(false) };
}

/// Unwind payload used by [`exit`]
struct ExitRequest;

/// Observable state of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ThreadState {
    /// Spawned, entry closure not started yet
    Created = 0,
    /// Entry closure is executing
    Running = 1,
    /// Entry closure returned, called [`exit`] or panicked
    Exited = 2,
    /// Consumed by [`Thread::join`]
    Joined = 3,
}

impl ThreadState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Exited,
            _ => Self::Joined,
        }
    }
}

enum Outcome<T> {
    Returned(T),
    Exited,
    Panicked(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Terminate the calling thread immediately
///
/// The rest of the entry closure is skipped and [`Thread::join`] returns
/// `Ok(None)`. Values on the stack are dropped while unwinding, so held
/// [`MutexGuard`](crate::sync::MutexGuard)s are released.
///
/// # Panics
///
/// Panics when called from a thread that was not created by [`Thread`].
pub fn exit() -> ! {
    if !MANAGED.with(|managed| managed.get()) {
        panic!("unithread::exit() called outside a thread created by Thread::create");
    }
    panic::resume_unwind(Box::new(ExitRequest))
}

/// Cloneable view of a thread's state that outlives the handle
#[derive(Clone)]
pub struct ThreadProbe {
    state: Arc<AtomicU8>,
}

impl ThreadProbe {
    /// Current state
    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ThreadProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadProbe").field("state", &self.state()).finish()
    }
}

/// Handle to a running OS thread that produces a `T`
///
/// The handle must be consumed by [`join`](Thread::join). Dropping it
/// detaches the thread.
pub struct Thread<T, B: ThreadBackend = DefaultBackend> {
    name: Option<String>,
    raw: B::Thread,
    state: Arc<AtomicU8>,
    outcome: Arc<SlotLock<Option<Outcome<T>>>>,
    log_lifecycle: bool,
    _backend: PhantomData<B>,
}

impl<T: Send + 'static> Thread<T> {
    /// Start a thread on the default backend with the default configuration
    ///
    /// ```rust
    /// use unithread::Thread;
    /// # fn main() -> unithread::Result<()> {
    /// let thread = Thread::create(Some("adder"), || 2 + 2)?;
    /// assert_eq!(thread.join()?, Some(4));
    /// # Ok(())
    /// # }
    /// ```
    pub fn create<F>(name: Option<&str>, entry: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::create_on(name, &ThreadConfig::default(), entry)
    }

    /// Start a thread on the default backend
    pub fn create_with_config<F>(name: Option<&str>, config: &ThreadConfig, entry: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::create_on(name, config, entry)
    }
}

impl<T: Send + 'static, B: ThreadBackend> Thread<T, B> {
    /// Start a thread on backend `B`
    pub fn create_on<F>(name: Option<&str>, config: &ThreadConfig, entry: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        if let Some(name) = name {
            if name.contains('\0') {
                return Err(ThreadError::invalid_argument(format!(
                    "thread name {:?} contains a NUL byte",
                    name
                )));
            }
        }
        config.validate()?;

        let state = Arc::new(AtomicU8::new(ThreadState::Created as u8));
        let outcome = Arc::new(SlotLock::new(None));
        let label = name.unwrap_or("<unnamed>").to_string();
        let log_lifecycle = config.log_lifecycle;

        let entry_state = Arc::clone(&state);
        let entry_outcome = Arc::clone(&outcome);
        let entry_label = label.clone();
        let raw_entry = Box::new(move || {
            MANAGED.with(|managed| managed.set(true));
            entry_state.store(ThreadState::Running as u8, Ordering::Release);
            if log_lifecycle {
                log::debug!("[{}] thread '{}' running", B::NAME, entry_label);
            }

            let result = match panic::catch_unwind(AssertUnwindSafe(entry)) {
                Ok(value) => Outcome::Returned(value),
                Err(payload) if payload.is::<ExitRequest>() => Outcome::Exited,
                Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
            };
            *entry_outcome.lock() = Some(result);

            entry_state.store(ThreadState::Exited as u8, Ordering::Release);
            MANAGED.with(|managed| managed.set(false));
            if log_lifecycle {
                log::debug!("[{}] thread '{}' exited", B::NAME, entry_label);
            }
        });

        let raw = B::spawn(name, config.stack_size, raw_entry).map_err(|e| {
            log::debug!("[{}] failed to create thread '{}': {}", B::NAME, label, e);
            e
        })?;
        log::trace!("[{}] created thread '{}'", B::NAME, label);

        Ok(Self {
            name: name.map(str::to_owned),
            raw,
            state,
            outcome,
            log_lifecycle,
            _backend: PhantomData,
        })
    }

    /// Diagnostic name given at creation
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current state
    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the entry closure is over (join will not block for long)
    pub fn is_finished(&self) -> bool {
        self.state() >= ThreadState::Exited
    }

    /// State observer that stays valid after `join`
    pub fn probe(&self) -> ThreadProbe {
        ThreadProbe { state: Arc::clone(&self.state) }
    }

    /// Block until the thread has terminated and release it
    ///
    /// Returns `Some(value)` when the entry closure returned and `None` when
    /// it called [`exit`]. A panic in the entry closure is reported as
    /// [`ThreadError::EntryPanicked`].
    pub fn join(self) -> Result<Option<T>> {
        let label = self.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
        self.raw.join()?;
        self.state.store(ThreadState::Joined as u8, Ordering::Release);
        if self.log_lifecycle {
            log::debug!("[{}] joined thread '{}'", B::NAME, label);
        }

        match self.outcome.lock().take() {
            Some(Outcome::Returned(value)) => Ok(Some(value)),
            Some(Outcome::Exited) => Ok(None),
            Some(Outcome::Panicked(message)) => Err(ThreadError::entry_panicked(label, message)),
            None => Err(ThreadError::backend_failure(
                B::NAME,
                "join",
                "thread terminated without reporting an outcome",
            )),
        }
    }
}

impl<T, B: ThreadBackend> fmt::Debug for Thread<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("backend", &B::NAME)
            .field("name", &self.name)
            .field("state", &ThreadState::from_u8(self.state.load(Ordering::Acquire)))
            .finish()
    }
}
