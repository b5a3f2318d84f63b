//! Lifecycle status protocol
//!
//! Threads that are created and torn down without blocking usually publish
//! their progress through a shared status slot owned by the calling code.
//! [`ThreadStatus`] is the closed set of values such a slot may hold. The
//! numeric codes are a stable contract: codes are grouped by decade so that
//! a plain range check tells which phase a thread is in.
//!
//! | Status | Code |
//! |---|---|
//! | `Nop` | 0 |
//! | `Create` / `Start` / `Ready` | 10 / 11 / 19 |
//! | `Destroy` / `End` / `Over` | 20 / 21 / 29 |
//! | `Error` / `Fatal` | 30 / 31 |
//!
//! This crate never reads or writes a status slot by itself.
//! [`AtomicThreadStatus`] is provided for callers that want a typed slot with
//! acquire/release ordering instead of a raw shared integer.

use crate::error::{Result, ThreadError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicI32, Ordering};

/// Progress of a thread as tracked by cooperating external code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum ThreadStatus {
    /// No operation in progress
    Nop = 0,
    /// Thread object is initializing
    Create = 10,
    /// Thread has begun executing
    Start = 11,
    /// Thread finished its own setup and is ready for work
    Ready = 19,
    /// A destruction request has been issued
    Destroy = 20,
    /// The thread acknowledged the destruction request
    End = 21,
    /// The thread object no longer exists
    Over = 29,
    /// A recoverable error occurred
    Error = 30,
    /// An unrecoverable error occurred; the process must terminate
    Fatal = 31,
}

/// Phase a status code belongs to, derived from its decade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusPhase {
    /// Codes 0..10
    Idle,
    /// Codes 10..20
    Creation,
    /// Codes 20..30
    Destruction,
    /// Codes 30..40
    Failure,
}

impl StatusPhase {
    /// Range of raw codes reserved for this phase
    pub fn range(self) -> Range<i32> {
        match self {
            Self::Idle => 0..10,
            Self::Creation => 10..20,
            Self::Destruction => 20..30,
            Self::Failure => 30..40,
        }
    }

    /// Classify a raw code, including codes inside a reserved gap
    pub fn of_code(code: i32) -> Option<Self> {
        match code {
            0..=9 => Some(Self::Idle),
            10..=19 => Some(Self::Creation),
            20..=29 => Some(Self::Destruction),
            30..=39 => Some(Self::Failure),
            _ => None,
        }
    }
}

impl ThreadStatus {
    /// Every status in protocol order
    pub const ALL: [ThreadStatus; 9] = [
        Self::Nop,
        Self::Create,
        Self::Start,
        Self::Ready,
        Self::Destroy,
        Self::End,
        Self::Over,
        Self::Error,
        Self::Fatal,
    ];

    /// Numeric protocol code
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Parse a numeric protocol code
    pub fn from_code(code: i32) -> Result<Self> {
        Self::decode(code).ok_or_else(|| {
            ThreadError::invalid_argument(format!("unknown thread status code {}", code))
        })
    }

    #[inline]
    const fn decode(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Nop),
            10 => Some(Self::Create),
            11 => Some(Self::Start),
            19 => Some(Self::Ready),
            20 => Some(Self::Destroy),
            21 => Some(Self::End),
            29 => Some(Self::Over),
            30 => Some(Self::Error),
            31 => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Phase this status belongs to
    pub fn phase(self) -> StatusPhase {
        match self.code() / 10 {
            0 => StatusPhase::Idle,
            1 => StatusPhase::Creation,
            2 => StatusPhase::Destruction,
            _ => StatusPhase::Failure,
        }
    }

    /// `Create`, `Start` or `Ready`
    pub fn is_creation_phase(self) -> bool {
        self.phase() == StatusPhase::Creation
    }

    /// `Destroy`, `End` or `Over`
    pub fn is_destruction_phase(self) -> bool {
        self.phase() == StatusPhase::Destruction
    }

    /// `Error` or `Fatal`
    pub fn is_error(self) -> bool {
        self.phase() == StatusPhase::Failure
    }

    /// No further transition is expected from this status
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Over | Self::Fatal)
    }

    /// Protocol name, as used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Create => "CREATE",
            Self::Start => "START",
            Self::Ready => "READY",
            Self::Destroy => "DESTROY",
            Self::End => "END",
            Self::Over => "OVER",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl Default for ThreadStatus {
    fn default() -> Self {
        Self::Nop
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

impl From<ThreadStatus> for i32 {
    fn from(status: ThreadStatus) -> i32 {
        status.code()
    }
}

impl TryFrom<i32> for ThreadStatus {
    type Error = ThreadError;

    fn try_from(code: i32) -> Result<Self> {
        Self::from_code(code)
    }
}

/// Shared status slot with a typed interface
///
/// Stores use `Release` and loads use `Acquire`, so whatever a thread wrote
/// before publishing `Ready` is visible to the code that observes `Ready`.
#[derive(Debug)]
pub struct AtomicThreadStatus {
    code: AtomicI32,
}

impl AtomicThreadStatus {
    /// Create a slot holding `status`
    pub const fn new(status: ThreadStatus) -> Self {
        Self {
            code: AtomicI32::new(status.code()),
        }
    }

    /// Current status
    pub fn load(&self) -> ThreadStatus {
        // only valid codes are ever stored
        ThreadStatus::decode(self.code.load(Ordering::Acquire)).unwrap_or(ThreadStatus::Fatal)
    }

    /// Publish a new status unconditionally
    pub fn store(&self, status: ThreadStatus) {
        self.code.store(status.code(), Ordering::Release);
    }

    /// Publish a new status and return the previous one
    pub fn swap(&self, status: ThreadStatus) -> ThreadStatus {
        let old = self.code.swap(status.code(), Ordering::AcqRel);
        ThreadStatus::decode(old).unwrap_or(ThreadStatus::Fatal)
    }

    /// Replace `current` with `new`; on mismatch returns the observed status
    pub fn compare_exchange(
        &self,
        current: ThreadStatus,
        new: ThreadStatus,
    ) -> std::result::Result<ThreadStatus, ThreadStatus> {
        self.code
            .compare_exchange(current.code(), new.code(), Ordering::AcqRel, Ordering::Acquire)
            .map(|old| ThreadStatus::decode(old).unwrap_or(ThreadStatus::Fatal))
            .map_err(|seen| ThreadStatus::decode(seen).unwrap_or(ThreadStatus::Fatal))
    }

    /// Move forward to `status` if it is later in the protocol than the
    /// current value. Returns `true` when the slot changed.
    pub fn advance(&self, status: ThreadStatus) -> bool {
        self.code
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (status.code() > current).then_some(status.code())
            })
            .is_ok()
    }
}

impl Default for AtomicThreadStatus {
    fn default() -> Self {
        Self::new(ThreadStatus::Nop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_codes_are_stable() {
        let codes: Vec<i32> = ThreadStatus::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![0, 10, 11, 19, 20, 21, 29, 30, 31]);
    }

    #[test]
    fn test_ordering_matches_protocol() {
        for pair in ThreadStatus::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ThreadStatus::from_code(19).unwrap(), ThreadStatus::Ready);
        assert!(ThreadStatus::from_code(12).is_err());
        assert!(matches!(
            ThreadStatus::from_code(-1),
            Err(ThreadError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_phases() {
        assert!(ThreadStatus::Start.is_creation_phase());
        assert!(ThreadStatus::End.is_destruction_phase());
        assert!(ThreadStatus::Fatal.is_error());
        assert!(!ThreadStatus::Nop.is_error());
        assert_eq!(StatusPhase::of_code(15), Some(StatusPhase::Creation));
        assert_eq!(StatusPhase::of_code(40), None);
        assert!(StatusPhase::Destruction.range().contains(&ThreadStatus::Over.code()));
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&ThreadStatus::Destroy).unwrap();
        assert_eq!(json, "20");
        let parsed: ThreadStatus = serde_json::from_str("31").unwrap();
        assert_eq!(parsed, ThreadStatus::Fatal);
        assert!(serde_json::from_str::<ThreadStatus>("7").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ThreadStatus::Ready.to_string(), "READY(19)");
    }

    #[test]
    fn test_atomic_advance_only_moves_forward() {
        let slot = AtomicThreadStatus::new(ThreadStatus::Create);
        assert!(slot.advance(ThreadStatus::Ready));
        assert!(!slot.advance(ThreadStatus::Start));
        assert_eq!(slot.load(), ThreadStatus::Ready);
        assert_eq!(
            slot.compare_exchange(ThreadStatus::Start, ThreadStatus::Destroy),
            Err(ThreadStatus::Ready)
        );
        assert_eq!(
            slot.compare_exchange(ThreadStatus::Ready, ThreadStatus::Destroy),
            Ok(ThreadStatus::Ready)
        );
        assert_eq!(slot.swap(ThreadStatus::Over), ThreadStatus::Destroy);
    }

    #[test]
    fn test_atomic_handshake_between_threads() {
        let slot = Arc::new(AtomicThreadStatus::default());
        slot.store(ThreadStatus::Create);

        let worker_slot = Arc::clone(&slot);
        let handle = thread::spawn(move || {
            worker_slot.store(ThreadStatus::Start);
            worker_slot.store(ThreadStatus::Ready);
            while worker_slot.load() != ThreadStatus::Destroy {
                thread::yield_now();
            }
            worker_slot.store(ThreadStatus::End);
        });

        while slot.load() != ThreadStatus::Ready {
            thread::yield_now();
        }
        slot.store(ThreadStatus::Destroy);
        handle.join().unwrap();
        assert_eq!(slot.load(), ThreadStatus::End);
        slot.store(ThreadStatus::Over);
        assert!(slot.load().is_terminal());
    }
}
