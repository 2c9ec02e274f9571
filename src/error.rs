//! Error types for stage reads, writes, transfers and user functions.
//!
//! Every failure surfaces to the caller. Records that were durably written before an
//! error stay on disk, so re-running the same stage resumes from them.

use crate::io::Codec;
use crate::io::cloud::ObjectStoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for stagecache.
#[derive(Debug, Error)]
pub enum StageError {
    /// `load` was called for a stage with no backing file.
    #[error("stage `{stage}` does not exist under {}", root.display())]
    StageNotFound { stage: String, root: PathBuf },

    /// A record's value does not deserialize into the requested type.
    #[error("record {record} in {} does not match the value schema: {message}", path.display())]
    SchemaMismatch {
        path: PathBuf,
        record: usize,
        message: String,
    },

    /// A record's envelope is broken (not a `key`/`value` pair, empty or duplicate key).
    #[error("malformed record {record} in {}: {message}", path.display())]
    MalformedRecord {
        path: PathBuf,
        record: usize,
        message: String,
    },

    /// The codec cannot represent this value type.
    #[error("{codec} codec cannot handle this value type: {message}")]
    UnsupportedValueType { codec: Codec, message: String },

    #[error("transfer of `{location}` failed: {message}")]
    Transfer {
        location: String,
        message: String,
        #[source]
        source: Option<ObjectStoreError>,
    },

    #[error("unsupported scheme `{scheme}` in `{uri}`")]
    UnsupportedScheme { scheme: String, uri: String },

    #[error("invalid location `{uri}`: {reason}")]
    InvalidLocation { uri: String, reason: &'static str },

    #[error("invalid stage name `{name}`: {reason}")]
    InvalidStageName { name: String, reason: &'static str },

    #[error("writer for {} is already closed", path.display())]
    WriterClosed { path: PathBuf },

    /// The caller's mapping or init function failed. Progress up to this key is kept.
    #[error("user function failed on key `{key}` in stage `{stage}`")]
    UserFunction {
        stage: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn transfer(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            location: location.into(),
            message: message.into(),
            source: None,
        }
    }

    /// The caller's original error, when this is a [`StageError::UserFunction`].
    #[must_use]
    pub fn user_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::UserFunction { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for stagecache.
pub type Result<T, E = StageError> = std::result::Result<T, E>;
