// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the index and search modules.

use thiserror::Error;

/// Two vectors of different length were compared.
///
/// This only happens when vectors from different models (or a misconfigured
/// encoder) end up side by side, so callers treat it as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dimension mismatch: {left} != {right}")]
pub struct DimensionMismatch {
    pub left: usize,
    pub right: usize,
}

/// The encoder could not be brought to a usable state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load encoder '{model}': {reason}")]
pub struct LoadError {
    pub model: String,
    pub reason: String,
}

/// A single encode call failed. Never retried in-line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("encoder '{0}' is not loaded")]
    NotLoaded(String),
    #[error("encoder failed: {0}")]
    Failed(String),
    #[error("encoder returned invalid output: {0}")]
    InvalidOutput(String),
}

/// The query could not be converted into token ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to tokenize query: {0}")]
pub struct TokenizeError(pub String);

/// The translation collaborator could not translate the query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("translation failed: {0}")]
pub struct TranslationError(pub String);

/// The photo source could not enumerate its assets.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("photo library not found: {0}")]
    NotFound(String),
    #[error("failed to scan photo library: {0}")]
    Scan(String),
}

/// Fatal failures of an indexing pass. Per-asset failures never show up here.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("model mismatch: requested '{requested}', encoder provides '{loaded}'")]
    ModelMismatch { requested: String, loaded: String },
    #[error("failed to build indexing thread pool: {0}")]
    ThreadPool(String),
}

/// Failures of a single search. The previously published results stay intact.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("failed to encode query: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),
    #[error("model mismatch: requested '{requested}', encoder provides '{loaded}'")]
    ModelMismatch { requested: String, loaded: String },
}
