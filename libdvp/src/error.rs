//! Errors returned by volume drivers.
//!
//! Docker only ever sees the `Display` text of a [`DriverError`]; the
//! variants exist so callers and tests can tell failures apart.

use libcsi::CsiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    /// The volume is not known to the driver.
    #[error("volume {0} not found")]
    NotFound(String),

    /// The volume exists but is not mounted on this host.
    #[error("volume {0} is not mounted")]
    NotMounted(String),

    /// A Create option is missing or malformed.
    #[error("invalid option {option}: {reason}")]
    InvalidOption { option: String, reason: String },

    /// The volume name cannot be used as a single path component.
    #[error("invalid volume name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// An NFS volume of that name already maps another export.
    #[error("volume {name} is already mapped to {existing}")]
    Conflict { name: String, existing: String },

    /// Mount of an unknown volume on a backend that cannot create one.
    #[error("volume {0} does not exist and cannot be created implicitly")]
    ImplicitCreateForbidden(String),

    #[error(transparent)]
    Csi(#[from] CsiError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Failure reported by a storage service handle.
    #[error("storage service: {0}")]
    Storage(String),
}

impl DriverError {
    pub fn invalid_option(option: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn storage<E: std::fmt::Display>(e: E) -> Self {
        Self::Storage(e.to_string())
    }
}
