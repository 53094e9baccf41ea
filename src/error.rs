//! Error types for the clustering engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use thiserror::Error;

/// Main error type for clustering operations.
///
/// Every variant is local to the call that produced it: the engine validates
/// its inputs before mutating anything, so a caller can reject the offending
/// vector or index and keep feeding the stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    ShapeMismatch { expected: usize, actual: usize },

    #[error(
        "Vector has no components\nSuggestion: The first vector fixes the engine dimension, so it must be non-empty"
    )]
    EmptyVector,

    #[error(
        "Vector component {index} is not a finite number\nSuggestion: Drop NaN or infinite values before clustering; check for overflow when decoding"
    )]
    NonFiniteVector { index: usize },

    #[error(
        "Failed to create subcluster ID: maximum subcluster count reached\nSuggestion: Start a new engine"
    )]
    SubclusterIdExhausted,

    #[error(
        "No {target} at index {index} (there are {len})\nSuggestion: Indices shift after a merge, re-read them instead of caching"
    )]
    IndexOutOfRange {
        target: &'static str,
        index: usize,
        len: usize,
    },

    #[error(
        "Cannot merge index {index} into itself\nSuggestion: Pass two distinct indices"
    )]
    SelfMerge { index: usize },

    #[error("Invalid clustering configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ClusterError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::EmptyVector => "EMPTY_VECTOR",
            Self::NonFiniteVector { .. } => "NON_FINITE_VECTOR",
            Self::SubclusterIdExhausted => "SUBCLUSTER_ID_EXHAUSTED",
            Self::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            Self::SelfMerge { .. } => "SELF_MERGE",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
        }
        .to_string()
    }

    /// Whether the stream can simply skip the offending input and continue.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig { .. } | Self::SubclusterIdExhausted
        )
    }

    pub(crate) fn cluster_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange {
            target: "cluster",
            index,
            len,
        }
    }

    pub(crate) fn subcluster_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange {
            target: "subcluster",
            index,
            len,
        }
    }
}

/// Errors raised while loading or saving settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write settings to '{path}': {source}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ClusterError),
}

/// Result type alias for clustering operations
pub type ClusterResult<T> = Result<T, ClusterError>;
