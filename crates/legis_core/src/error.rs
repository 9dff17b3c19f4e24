//! Error types for each ingestion stage and for the query service.

use std::path::PathBuf;
use thiserror::Error;

/// The session's source files could not be materialized locally.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not run rsync: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("rsync from {remote} exited with {status}")]
    Sync { remote: String, status: String },

    #[error("source directory {} does not exist", .0.display())]
    Missing(PathBuf),
}

/// A source document could not be turned into a record.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("<{element}> has no datetime attribute")]
    MissingDatetime { element: String },

    #[error("unparseable datetime {value:?}")]
    Datetime { value: String },

    #[error("file name {0:?} does not look like a roll call")]
    RollFilename(String),
}

/// Storage-layer failures. `Invalid` is the only one a run survives.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation failed: {}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures the query service reports as a server error rather than a 404.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why an ingestion run stopped before processing every file.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("another run holds {}", .path.display())]
    Locked { path: PathBuf },

    #[error("could not create lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not load legislators: {0}")]
    Index(#[source] StoreError),

    #[error("{file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    #[error("{file}: {source}")]
    Store {
        file: String,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    /// The source file being processed when the run stopped, if any.
    pub fn file(&self) -> Option<&str> {
        match self {
            IngestError::Fetch(_)
            | IngestError::Locked { .. }
            | IngestError::Lock { .. }
            | IngestError::Index(_) => None,
            IngestError::Parse { file, .. } | IngestError::Store { file, .. } => Some(file),
        }
    }
}
