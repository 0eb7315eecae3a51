//! Common error types for coreswitch.
//!
//! Parsing failures from the identifier, engine and version types all funnel
//! into `CoreError` so higher layers can convert them with `?`.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors shared across coreswitch crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An unsupported engine name was provided.
    #[error(transparent)]
    UnknownEngine(#[from] crate::engine::UnknownEngine),

    /// A version string could not be parsed.
    #[error(transparent)]
    InvalidVersion(#[from] crate::capability::VersionError),
}
