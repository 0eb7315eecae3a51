//! Error types for template rendering.

use coreswitch_codec::CodecError;
use thiserror::Error;

/// A result type using `TemplateError`.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors that can occur while compiling or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template text is not well-formed.
    #[error("syntax error on line {line}: {message}")]
    Syntax {
        /// 1-based line of the offending tag.
        line: usize,
        /// What is wrong.
        message: String,
    },

    /// A placeholder refers to a value that is not in the context.
    #[error("unresolved placeholder {0:?}")]
    UnresolvedPath(String),

    /// A value has the wrong type for the block using it.
    #[error("{path:?} must be {expected}")]
    TypeMismatch {
        /// Placeholder path.
        path: String,
        /// Expected JSON type.
        expected: &'static str,
    },

    /// Building the render context failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The render context could not be encoded.
    #[error("context serialization failed: {0}")]
    Context(String),
}
