//! Error types shared by every bucket.
//!
//! Backends report their own transport failures through `Transport` or `Io`,
//! but must translate "no such file" conditions into `FileNotFound` so callers
//! can handle a missing object the same way regardless of the store.

use std::path::PathBuf;

/// Result type alias for bucketfs operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The object does not exist. `path` is the caller-visible path, with any
    /// bucket prefix already stripped.
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unable to resolve URL, scheme {scheme:?} is not registered")]
    UnresolvableScheme { scheme: String },

    #[error("Scheme {scheme:?} is already registered")]
    DuplicateScheme { scheme: String },

    #[error("Scheme {scheme:?} is not registered")]
    UnknownScheme { scheme: String },

    /// A write was attempted after the writer was committed or discarded.
    #[error("Writer is closed")]
    WriterClosed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid option {key:?}: {message}")]
    InvalidOption { key: String, message: String },

    #[error("Invalid file mode {value:?}")]
    InvalidMode { value: String },

    #[error("Invalid glob pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid path {path:?}: {message}")]
    InvalidPath { path: String, message: String },

    #[error("Bucket root {path:?} is invalid: {source}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation not supported: {operation}")]
    NotSupported { operation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (network, protocol, remote shell, ...).
    #[error("Transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::FileNotFound { path: path.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileNotFound { .. })
    }
}

impl From<Error> for std::io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(e) => e,
            Error::FileNotFound { .. } => std::io::Error::new(std::io::ErrorKind::NotFound, error),
            other => std::io::Error::other(other),
        }
    }
}
