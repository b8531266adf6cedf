//! Error types for input validation and asset resolution.

use std::path::PathBuf;
use thiserror::Error;

use super::resolver::AssetRole;

/// Validation and resolution failures.
///
/// Every variant names the offending input and its role (style vs script) so
/// the registration caller sees exactly which argument was rejected.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unsafe {role} path '{value}': absolute paths, '..' segments and drive prefixes are not allowed")]
    UnsafePattern { role: AssetRole, value: String },

    #[error("{role} '{value}' is file-backed: component must declare an asset root to use file-backed assets")]
    MissingRoot { role: AssetRole, value: String },

    #[error("{role} '{value}' resolves outside the component asset root")]
    OutsideRoot { role: AssetRole, value: String },

    #[error("no files found for {role} '{value}'")]
    NoMatches { role: AssetRole, value: String },

    #[error("{role} pattern '{value}' matches {} files, expected exactly one: {candidates:?}", .candidates.len())]
    Ambiguous {
        role: AssetRole,
        value: String,
        candidates: Vec<PathBuf>,
    },

    #[error("invalid {role} glob pattern '{value}': {source}")]
    BadPattern {
        role: AssetRole,
        value: String,
        source: glob::PatternError,
    },

    #[error("asset root '{root}' is not usable: {source}")]
    RootUnavailable {
        root: PathBuf,
        source: std::io::Error,
    },
}

pub type ResolveResult<T> = Result<T, ResolveError>;
