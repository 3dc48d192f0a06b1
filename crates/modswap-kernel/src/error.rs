//! Crate-level error types for `modswap-kernel`.
//!
//! [`KernelError`] composes the typed errors of the kernel's sub-modules and
//! is carried inside an [`error_stack::Report`] so callers can attach context
//! (which file, which module) while the error travels up.
//!
//! ```rust,ignore
//! use modswap_kernel::error::{KernelError, KernelResult};
//! use error_stack::ResultExt;
//!
//! fn read_ignore_list(path: &str) -> KernelResult<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(KernelError::from)
//!         .map_err(error_stack::Report::new)
//!         .attach(format!("reading {path}"))
//! }
//! ```

use thiserror::Error;

use crate::config::ConfigError;
use crate::host::{HostError, RegistryAccessError};

/// Crate-level error type for `modswap-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// Configuration could not be read or is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A host capability failed.
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// The host's internal registries are unreachable.
    #[error(transparent)]
    Registry(#[from] RegistryAccessError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;
