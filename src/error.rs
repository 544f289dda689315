//! Unified error type.

use thiserror::Error;

/// Shorthand for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by vigil's fallible operations.
///
/// Application-level errors (404, 500, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s, and the middleware
/// layers never surface errors to request handling. This type covers
/// start-up work: binding a port, loading configuration, building the
/// latency digests and publishing diagnostic variables.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("var `{0}` is already published")]
    DuplicateVar(String),
}
