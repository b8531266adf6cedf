//! Error types for the component registry.

use thiserror::Error;

/// Errors from registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// `update` was called for a name that was never registered (or has been
    /// unregistered). Guards against a background watcher resurrecting a
    /// component the caller explicitly removed.
    #[error("cannot update unknown component '{name}': register it first")]
    UnknownComponent { name: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
