//! Error types for livelog stream operations.
//!
//! This module defines [`Error`], the error type shared by the stream core,
//! along with a convenient [`Result`] type alias. Range parsing has its own
//! typed error ([`crate::range::RangeError`]) because its message doubles as
//! an HTTP response body; startup configuration failures live in
//! [`crate::config::ConfigError`] because they carry process exit codes.

/// Error type for stream ingestion and delivery.
///
/// # Error Categories
///
/// - [`Producer`](Error::Producer): The producer source failed mid-stream.
///   The stream is closed and observers drain whatever was buffered; only
///   the ingest driver sees this error.
/// - [`Sink`](Error::Sink): An observer's sink rejected a write. Affects
///   only that observer; the stream and other observers are untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The producer source returned an error before reaching end of stream.
    Producer(String),

    /// The observer's sink failed while bytes were being copied to it.
    Sink(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Producer(msg) => write!(f, "producer error: {}", msg),
            Error::Sink(msg) => write!(f, "sink error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Sink(err.to_string())
    }
}

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, Error>;
