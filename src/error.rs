//! Error type shared by every stream backing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::token::TokenKind;

/// Failures reported by [`crate::Stream`] and its backings.
///
/// Reaching the end of the data is never reported through this type: short
/// reads return a smaller count and single-byte reads return `None`.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The file behind the stream could not be opened when it was constructed.
    #[error("stream is unusable: the underlying file was never opened")]
    Unusable,

    /// A subfile redirection or a temporary buffer is already active.
    #[error("stream is busy: a redirection is already active")]
    Busy,

    /// The subfile could not be opened. The stream is left untouched.
    #[error("cannot open subfile {}: {}", .path.display(), .source)]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No token of the requested kind at the current position.
    #[error("no {0} token at the current position")]
    Parse(TokenKind),

    /// Only `%d` and `%f` are understood by the token scanner.
    #[error("unsupported scan format '{0}' (expected '%d' or '%f')")]
    UnsupportedFormat(String),

    /// The operation makes no sense for this kind of backing.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(e) => e,
            StreamError::Unusable => io::Error::new(io::ErrorKind::NotConnected, StreamError::Unusable),
            other => io::Error::other(other),
        }
    }
}
