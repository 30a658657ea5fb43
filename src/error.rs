//! Request error types with a coarse protocol-facing classification.

use std::fmt;
use std::io;

/// Classification attached to request errors so upstream collaborators can
/// make protocol-level decisions (e.g. map to a 4xx response) without
/// inspecting error internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unspecified internal failure.
    Internal,

    /// Malformed client input; maps to a bad-request-class response.
    BadRequest,
}

/// Errors produced by request construction and body handling.
#[derive(Debug)]
pub enum Error {
    /// The request URL failed to parse at construction.
    InvalidUrl(http::uri::InvalidUri),

    /// Serializing a value into the body failed during encode.
    Encode(serde_json::Error),

    /// Parsing the body failed during decode.
    Decode(serde_json::Error),

    /// Reading, draining, or copying a body failed.
    Io(io::Error),
}

impl Error {
    /// The classification for this error.
    ///
    /// Decode failures are always [`ErrorCode::BadRequest`], independent of
    /// the underlying cause; everything else is internal.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Decode(_) => ErrorCode::BadRequest,
            _ => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUrl(e) => write!(f, "invalid request URL: {}", e),
            Error::Encode(e) => write!(f, "encoding request body: {}", e),
            Error::Decode(e) => write!(f, "decoding request body: {}", e),
            Error::Io(e) => write!(f, "request body I/O: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidUrl(e) => Some(e),
            Error::Encode(e) => Some(e),
            Error::Decode(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(e: http::uri::InvalidUri) -> Self {
        Error::InvalidUrl(e)
    }
}

/// Result type alias for request operations.
pub type Result<T> = std::result::Result<T, Error>;
