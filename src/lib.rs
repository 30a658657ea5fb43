//! reqcore - Request envelope core for an HTTP client/server toolkit.
//!
//! This crate provides the unified request value shared by clients and
//! servers: an HTTP message (method, URI, headers, body), a cancellable
//! execution context, a deferred construction error, and JSON codec helpers.
//!
//! # Body lifecycle
//!
//! An HTTP body is a one-shot stream: once consumed or closed it can never be
//! read again. The [`Body`] type and the [`Request`] read/write paths manage
//! that lifecycle so callers can:
//!
//! - read a body fully while keeping it readable for later collaborators
//!   (a one-shot stream is converted to a [`ReplayBuffer`] as a side effect),
//! - write into a body that a caller replaced with an arbitrary stream
//!   (the stream is drained ahead of the new bytes),
//! - rely on the original stream being closed exactly once, with no bytes
//!   silently lost on error.
//!
//! # Context chains
//!
//! Requests are routinely used as the execution context of child requests.
//! [`Context::resolved`] flattens the resulting wrapper chain to the
//! innermost concrete context so cancellation wiring stays on the fast path.
//!
//! # Example
//!
//! ```rust,ignore
//! use http::Method;
//! use reqcore::{Context, Request};
//!
//! let mut req = Request::with_body(
//!     Some(Context::with_timeout(std::time::Duration::from_secs(5))),
//!     Method::POST,
//!     "http://svc/x",
//!     &serde_json::json!({"a": 1}),
//! );
//! let body = req.body_bytes(false)?; // replayable
//! ```

pub mod body;
pub mod context;
pub mod error;
pub mod request;

// Re-exports for convenience
pub use body::{Body, BodyStream, CountingWriter, NoopClose, ReplayBuffer};
pub use context::{Context, Scope};
pub use error::{Error, ErrorCode, Result};
pub use request::{Request, DEFAULT_CHUNK_THRESHOLD};

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
