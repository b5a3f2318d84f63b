//! Configuration APIs for unithread
//!
//! Thread creation accepts a [`ThreadConfig`] that controls the native stack
//! size and lifecycle logging. Configurations implement [`Config`]: they can
//! be validated, read from environment variables and stored as JSON.
//!
//! ```rust
//! use unithread::config::{Config, ThreadConfig};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize from environment variables with UNITHREAD_ prefix
//! let config = ThreadConfig::from_env()?;
//! assert!(config.validate().is_ok());
//!
//! let config = ThreadConfig::default().with_stack_size(256 * 1024);
//! assert!(config.validate().is_ok());
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, ThreadError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub mod thread;


pub use thread::{min_stack_size, ThreadConfig};

/// Prefix used by [`Config::from_env`]
pub const DEFAULT_ENV_PREFIX: &str = "UNITHREAD_";

/// Validation, environment loading and JSON persistence shared by all
/// configuration types.
pub trait Config: Clone + fmt::Debug + Default + Serialize + DeserializeOwned {
    /// Name used in error messages, e.g. "thread"
    const COMPONENT: &'static str;

    /// Validate the configuration for correctness and consistency.
    fn validate(&self) -> Result<()>;

    /// Initialize configuration from environment variables.
    ///
    /// Environment variables use the format `UNITHREAD_{COMPONENT}_{FIELD}`,
    /// for example `UNITHREAD_THREAD_STACK_SIZE=65536`.
    fn from_env() -> Result<Self> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Initialize configuration from environment variables with a custom prefix.
    fn from_env_with_prefix(prefix: &str) -> Result<Self>;

    /// Save configuration to a JSON file.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self).map_err(|e| {
            ThreadError::configuration(format!("Failed to serialize {} config: {}", Self::COMPONENT, e))
        })?;
        std::fs::write(path, serialized).map_err(|e| {
            ThreadError::configuration(format!("Failed to write {} config file: {}", Self::COMPONENT, e))
        })
    }

    /// Load configuration from a JSON file and validate it.
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ThreadError::configuration(format!("Failed to read {} config file: {}", Self::COMPONENT, e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ThreadError::configuration(format!("Failed to parse {} config file: {}", Self::COMPONENT, e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// missing. A value that does not parse is logged and also falls back.
pub fn parse_env_var<T>(var_name: &str, default: T) -> T
where
    T: FromStr,
{
    match env::var(var_name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring malformed {}={:?}, using the default", var_name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse an environment variable that must be well-formed when present.
///
/// Returns `Ok(None)` when the variable is unset and a `Configuration` error
/// when it is set to something that does not parse.
pub fn require_env_var<T>(var_name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(var_name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e| {
            ThreadError::configuration(format!("{}={:?} is invalid: {}", var_name, raw, e))
        }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ThreadError::configuration(format!("{}: {}", var_name, e))),
    }
}

/// Parse a boolean environment variable.
///
/// Accepts "true", "1", "yes", "on" and "false", "0", "no", "off"
/// (case-insensitive). Anything else is logged and yields `default`.
pub fn parse_env_bool(var_name: &str, default: bool) -> bool {
    let Ok(raw) = env::var(var_name) else {
        return default;
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            log::warn!("ignoring malformed {}={:?}, using {}", var_name, raw, default);
            default
        }
    }
}
