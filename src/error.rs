//! Error types for the store, the search engine and the embedding pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for embedstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by an [`EmbeddingProvider`](crate::embedder::EmbeddingProvider).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// A failure expected to clear if the call is repeated after a delay.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider is loading its model and expects to be ready after `estimated`.
    #[error("provider is warming up, ready in about {estimated:?}")]
    WarmingUp { estimated: Duration },

    /// The provider answered, but not with something we can use.
    #[error("unexpected provider response: {0}")]
    UnexpectedResponse(String),
}

impl ProviderError {
    /// Whether the retry policy is allowed to repeat the call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::WarmingUp { .. })
    }
}

/// Errors surfaced by the store, the search engine and the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The provider kept failing transiently until the retry budget ran out.
    #[error("embedding unavailable after {attempts} attempts: {reason}")]
    EmbeddingUnavailable { attempts: u32, reason: String },

    /// Non-transient provider failure, never retried.
    #[error(transparent)]
    Provider(ProviderError),

    #[error("entry with id={id} already exists in the store")]
    DuplicateEntry { id: String },

    #[error("embedding must have {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Zero magnitude or non-finite components; cosine similarity is undefined.
    #[error("embedding has zero magnitude or non-finite components")]
    ZeroVector,

    #[error("snapshot '{}' is corrupt: {reason}", path.display())]
    StorageCorrupt { path: PathBuf, reason: String },

    #[error("snapshot I/O failed for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Errors caused by the caller's input rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateEntry { .. } | Self::DimensionMismatch { .. } | Self::ZeroVector
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StorageCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
