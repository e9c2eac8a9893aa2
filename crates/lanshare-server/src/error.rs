//! Server error types.

use std::path::PathBuf;

use crate::http::HttpError;

/// Errors that can occur in the server.
///
/// Only startup errors are fatal; per-request failures are answered on the
/// connection and logged.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Binding the listening socket failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested bind address
        addr: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configured static asset directory is unusable
    #[error("static asset directory {} is not a directory", path.display())]
    StaticDir {
        /// The configured path
        path: PathBuf,
    },

    /// Transport/network error
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// HTTP framing error on a connection
    #[error("http error: {0}")]
    Http(#[from] HttpError),
}
