//! Error types for parsing and converting engine configurations.

use coreswitch_core::UnknownEngine;
use thiserror::Error;

/// A result type using `CodecError`.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors that can occur while parsing or serializing configurations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input is empty.
    #[error("configuration input is empty")]
    EmptyInput,

    /// An engine name was not supplied.
    #[error("{0} engine is required")]
    MissingEngine(&'static str),

    /// An engine name is not supported.
    #[error(transparent)]
    UnknownEngine(#[from] UnknownEngine),

    /// The input is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The top level of the document has the wrong shape.
    #[error("invalid configuration: {0}")]
    InvalidDocument(String),

    /// A listener is structurally present but malformed.
    #[error("inbound #{index} ({tag}): {reason}")]
    InvalidInbound {
        /// Position in the `inbounds` array.
        index: usize,
        /// Listener tag, or `<untagged>`.
        tag: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Output could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// An error annotated with the name of the file it came from.
    #[error("{file}: {source}")]
    InFile {
        /// File name supplied by the caller.
        file: String,
        /// The underlying error.
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    pub(crate) fn inbound(index: usize, tag: &str, reason: impl Into<String>) -> Self {
        let tag = if tag.is_empty() { "<untagged>" } else { tag };
        Self::InvalidInbound {
            index,
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by caller input rather than by encoding.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Serialization(_) => false,
            Self::InFile { source, .. } => source.is_validation(),
            _ => true,
        }
    }
}
