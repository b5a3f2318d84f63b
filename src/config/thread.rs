//! Thread creation configuration.

use super::{parse_env_bool, require_env_var, Config};
use crate::error::{Result, ThreadError};
use serde::{Deserialize, Serialize};

/// Portable lower bound for a thread stack
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Largest stack accepted for a new thread
pub const MAX_STACK_SIZE: usize = 1024 * 1024 * 1024;

/// Smallest stack accepted on this target
///
/// [`MIN_STACK_SIZE`] raised to `PTHREAD_STACK_MIN` on Linux, which is larger
/// on targets with 64 KiB pages.
pub fn min_stack_size() -> usize {
    #[cfg(target_os = "linux")]
    {
        MIN_STACK_SIZE.max(libc::PTHREAD_STACK_MIN)
    }
    #[cfg(not(target_os = "linux"))]
    {
        MIN_STACK_SIZE
    }
}

/// Options applied when a thread is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Native stack size in bytes (`None` = backend default)
    pub stack_size: Option<usize>,
    /// Log every lifecycle transition at debug level
    pub log_lifecycle: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            stack_size: None,
            log_lifecycle: true,
        }
    }
}

impl ThreadConfig {
    /// Same configuration with an explicit stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Same configuration with lifecycle logging switched on or off
    pub fn with_lifecycle_logging(mut self, enabled: bool) -> Self {
        self.log_lifecycle = enabled;
        self
    }
}

impl Config for ThreadConfig {
    const COMPONENT: &'static str = "thread";

    fn validate(&self) -> Result<()> {
        if let Some(size) = self.stack_size {
            let min = min_stack_size();
            if size < min {
                return Err(ThreadError::configuration(format!(
                    "stack_size {} is below the minimum of {} bytes",
                    size, min
                )));
            }
            if size > MAX_STACK_SIZE {
                return Err(ThreadError::configuration(format!(
                    "stack_size {} exceeds the maximum of {} bytes",
                    size, MAX_STACK_SIZE
                )));
            }
        }
        Ok(())
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self> {
        let mut config = Self::default();
        // 0 keeps the backend default
        if let Some(size) = require_env_var::<usize>(&format!("{}THREAD_STACK_SIZE", prefix))? {
            config.stack_size = (size != 0).then_some(size);
        }
        config.log_lifecycle = parse_env_bool(
            &format!("{}THREAD_LOG_LIFECYCLE", prefix),
            config.log_lifecycle,
        );
        config.validate()?;
        Ok(config)
    }
}
