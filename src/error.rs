//! Error types for aggregation and for the offline post source.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures of an aggregation run.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// Target directory does not exist or cannot be listed.
    #[error("metadata directory not found or unreadable: {}", path.display())]
    DirectoryNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid sidecar file pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Destination could not be written; the destination is left untouched.
    #[error("failed to write table to {}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Why a single sidecar file was skipped. Never aborts a run.
#[derive(Error, Debug)]
pub enum MalformedRecord {
    #[error("unreadable: {0}")]
    Unreadable(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("top-level JSON value is {0}, expected an object")]
    NotAnObject(&'static str),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open post dump {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize metadata for post {shortcode}")]
    Serialize {
        shortcode: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = AggregateError> = std::result::Result<T, E>;
