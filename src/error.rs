//! Error types for the adaptive cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
///
/// Nothing in this crate is fatal to the host process: these errors are
/// returned from the few operations that can reject their input, and are
/// otherwise logged and swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is empty or exceeds the maximum key length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No async runtime is available to run a background task
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
