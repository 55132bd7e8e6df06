//! Error types for syndes operations.
//!
//! Validation failures (duplicate labels, unknown IDs, exceeded capacities)
//! are sentinel returns on the affected call, not errors. The error types
//! here cover what actually aborts an operation: I/O failures, corrupt files,
//! rejected configurations, and broken internal invariants.

use std::path::PathBuf;
use thiserror::Error;

/// Persistent-store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt header in {path}: {reason}")]
    CorruptHeader { path: PathBuf, reason: String },

    #[error("corrupt body in {path}: {reason}")]
    CorruptBody { path: PathBuf, reason: String },

    #[error("invalid store configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("malformed JSON automaton: {reason}")]
    MalformedJson { reason: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt_header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StoreError::CorruptHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt_body(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StoreError::CorruptBody {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        StoreError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn malformed_json(reason: impl Into<String>) -> Self {
        StoreError::MalformedJson {
            reason: reason.into(),
        }
    }
}

/// Automata-operation errors.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("composite state id overflows 64 bits: {n_states} states across {slots} slots")]
    CompositeOverflow { n_states: u64, slots: usize },

    #[error("renumbering broke the dense-ID invariant: {details}")]
    RenumberInvariant { details: String },
}

/// Master error type for all syndes errors.
#[derive(Debug, Error)]
pub enum SyndesError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("operation error: {0}")]
    Operation(#[from] OperationError),
}

/// Result type alias for syndes operations.
pub type SyndesResult<T> = Result<T, SyndesError>;
