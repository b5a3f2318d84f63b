//! Error handling for unithread
//!
//! Every primitive reports failures synchronously through [`ThreadError`].
//! Nothing in this crate retries or recovers on its own: the caller decides
//! whether a failure is recoverable (see [`ThreadError::status`]).

use crate::status::ThreadStatus;
use thiserror::Error;

/// Main error type for the unithread library
#[derive(Error, Debug)]
pub enum ThreadError {
    /// Malformed argument, such as a thread name with an interior NUL byte
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument
        message: String,
    },

    /// Operation on a handle that was never initialized or already destroyed
    #[error("Not initialized: {resource}")]
    NotInitialized {
        /// Kind of handle, e.g. "mutex"
        resource: &'static str,
    },

    /// Second `init` on a handle that is already live
    #[error("Already initialized: {resource}")]
    AlreadyInitialized {
        /// Kind of handle, e.g. "condition variable"
        resource: &'static str,
    },

    /// The native threading backend rejected the request
    #[error("Backend failure in {backend}::{operation}: {message}")]
    BackendFailure {
        /// Name of the backend that failed
        backend: &'static str,
        /// Native operation that failed
        operation: &'static str,
        /// Native error code, when the backend reports one
        code: Option<i32>,
        /// Human readable description
        message: String,
    },

    /// The entry closure of a thread panicked instead of returning
    #[error("Thread '{thread}' panicked: {message}")]
    EntryPanicked {
        /// Diagnostic name of the thread
        thread: String,
        /// Panic payload rendered as text
        message: String,
    },

    /// Configuration or parameter errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl ThreadError {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Create a not initialized error
    pub fn not_initialized(resource: &'static str) -> Self {
        Self::NotInitialized { resource }
    }

    /// Create an already initialized error
    pub fn already_initialized(resource: &'static str) -> Self {
        Self::AlreadyInitialized { resource }
    }

    /// Create a backend failure without a native error code
    pub fn backend_failure<S: Into<String>>(
        backend: &'static str,
        operation: &'static str,
        message: S,
    ) -> Self {
        Self::BackendFailure {
            backend,
            operation,
            code: None,
            message: message.into(),
        }
    }

    /// Create a backend failure from a native errno-style return code
    pub fn from_errno(backend: &'static str, operation: &'static str, code: i32) -> Self {
        Self::BackendFailure {
            backend,
            operation,
            code: Some(code),
            message: std::io::Error::from_raw_os_error(code).to_string(),
        }
    }

    /// Create a backend failure from an I/O error returned by the standard library
    pub fn from_io(backend: &'static str, operation: &'static str, err: &std::io::Error) -> Self {
        Self::BackendFailure {
            backend,
            operation,
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }

    /// Create an entry panicked error
    pub fn entry_panicked<S: Into<String>, M: Into<String>>(thread: S, message: M) -> Self {
        Self::EntryPanicked {
            thread: thread.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Check if this is a recoverable error
    ///
    /// Backend failures are recoverable only when the native code signals a
    /// transient condition (resource exhaustion or interruption).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidArgument { .. } => false,
            Self::NotInitialized { .. } => false,
            Self::AlreadyInitialized { .. } => true,
            Self::BackendFailure { code, .. } => code.map_or(false, |code| {
                matches!(
                    std::io::Error::from_raw_os_error(code).kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::OutOfMemory
                        | std::io::ErrorKind::Interrupted
                )
            }),
            Self::EntryPanicked { .. } => true,
            Self::Configuration { .. } => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "argument",
            Self::NotInitialized { .. } => "lifecycle",
            Self::AlreadyInitialized { .. } => "lifecycle",
            Self::BackendFailure { .. } => "backend",
            Self::EntryPanicked { .. } => "thread",
            Self::Configuration { .. } => "config",
        }
    }

    /// Status code a caller should record for this failure
    pub fn status(&self) -> ThreadStatus {
        if self.is_recoverable() {
            ThreadStatus::Error
        } else {
            ThreadStatus::Fatal
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ThreadError>;
