//! The request value used by both clients and servers: HTTP message fields,
//! an execution context, a body with controlled lifecycle, and a sticky
//! construction error, with JSON codec helpers layered on the body.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::body::{Body, CountingWriter};
use crate::context::Context;
use crate::error::{Error, Result};

/// Serialized-payload size below which encode pre-computes an exact content
/// length. At or above it the length is left unknown so the transport can
/// stream the body chunked rather than buffering it just to learn its size.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 5 * 1024 * 1024;

/// Pre-allocated content-type value for the structured format.
static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Sentinel for an unknown content length.
const CONTENT_LENGTH_UNKNOWN: i64 = -1;

/// An HTTP request.
///
/// Construction never fails outright: URL-parse and encode failures are
/// captured in a sticky error (see [`Request::error`]) so builder-style call
/// chains stay safe, and are checked lazily by whoever sends or serves the
/// request. The body always exists; it starts as an empty replay buffer and
/// every operation that needs to keeps it replayable (see [`Body`]).
///
/// A request is not safe for concurrent mutation; its [`Context`] is the
/// concurrency-safe part and may be cancelled from anywhere.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Option<Uri>,
    headers: HeaderMap,
    content_length: i64,
    chunk_threshold: usize,
    body: Body,
    context: Context,
    error: Option<Error>,
}

impl Request {
    /// Creates a request for `method` on `url`.
    ///
    /// A missing context defaults to the background context. A URL that fails
    /// to parse is captured as the construction error rather than raised; the
    /// returned request is still usable for configuration.
    pub fn new(ctx: Option<Context>, method: Method, url: &str) -> Self {
        let (uri, error) = match url.parse::<Uri>() {
            Ok(uri) => (Some(uri), None),
            Err(e) => (None, Some(Error::InvalidUrl(e))),
        };
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            content_length: CONTENT_LENGTH_UNKNOWN,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            body: Body::empty(),
            context: ctx.unwrap_or_default(),
            error,
        }
    }

    /// Creates a request and encodes `value` into its body.
    ///
    /// Encoding is skipped when URL parsing failed; the parse error stays as
    /// the construction error.
    pub fn with_body<T: Serialize + ?Sized>(
        ctx: Option<Context>,
        method: Method,
        url: &str,
        value: &T,
    ) -> Self {
        let mut req = Self::new(ctx, method, url);
        if req.error.is_none() {
            req.encode(value);
        }
        req
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn uri(&self) -> Option<&Uri> {
        self.uri.as_ref()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Exact body size in bytes, or `-1` when unknown. A non-negative value
    /// is authoritative for the transport.
    #[inline]
    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    #[inline]
    pub fn set_content_length(&mut self, len: i64) {
        self.content_length = len;
    }

    /// Adjusts the eager content-length boundary used by [`Request::encode`].
    #[inline]
    pub fn set_chunk_threshold(&mut self, threshold: usize) {
        self.chunk_threshold = threshold;
    }

    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Replaces the body outright. An installed one-shot stream is converted
    /// back to a buffer by the next write or replayable read.
    #[inline]
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The innermost non-request context; what the transport should wire
    /// cancellation against. See [`Context::resolved`].
    #[inline]
    pub fn resolved_context(&self) -> &Context {
        self.context.resolved()
    }

    /// The sticky construction error, if any. Set by a failed URL parse or a
    /// failed encode and never cleared; check it before trusting the body or
    /// headers.
    #[inline]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Fully reads the body.
    ///
    /// With `consume` the body is read to the end and closed in place; it is
    /// exhausted afterwards. Without it the full contents are returned while
    /// the body stays (or becomes) replayable, so a later collaborator can
    /// read the same bytes again.
    pub fn body_bytes(&mut self, consume: bool) -> Result<Bytes> {
        self.body.read_all(consume).map_err(Error::from)
    }

    /// Serializes `value` as JSON into the body and sets the content-type
    /// header.
    ///
    /// Failures are captured as the sticky construction error rather than
    /// returned. On success, if the content length is still unknown and the
    /// serialized size is under the chunk threshold, the exact size is
    /// recorded; larger payloads are left to chunked transfer. A no-op when a
    /// construction error is already present.
    pub fn encode<T: Serialize + ?Sized>(&mut self, value: &T) {
        if self.error.is_some() {
            return;
        }

        let mut sink = CountingWriter::new(&mut *self);
        let result = serde_json::to_writer(&mut sink, value);
        let written = sink.count();

        match result {
            Ok(()) => {
                self.headers
                    .insert(header::CONTENT_TYPE, APPLICATION_JSON.clone());
                if self.content_length < 0 && (written as usize) < self.chunk_threshold {
                    self.content_length = written as i64;
                }
            }
            Err(e) => {
                self.error = Some(Error::Encode(e));
            }
        }
    }

    /// Consumes the body and parses it as JSON.
    ///
    /// Read failures classify as [`crate::ErrorCode::Internal`]; parse
    /// failures always classify as [`crate::ErrorCode::BadRequest`] so
    /// upstream logic can answer with a 4xx without inspecting the cause.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.body_bytes(true)?;
        serde_json::from_slice(&bytes).map_err(Error::Decode)
    }
}

impl Write for Request {
    /// Appends to the body via the body write path: a caller-installed
    /// one-shot stream is drained into a replay buffer (and closed) before
    /// the new bytes are appended behind its content.
    ///
    /// Short-circuits with the sticky construction error when one is set,
    /// since those bytes could never be transmitted correctly.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(err) = &self.error {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("request construction failed: {}", err),
            ));
        }
        self.body.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for Request {
    /// Short human-readable identifier: `Request(GET http://svc/x)`, or
    /// `Request(Unknown)` when no usable URL was parsed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(uri) = &self.uri {
            if let (Some(scheme), Some(host)) = (uri.scheme_str(), uri.host()) {
                return write!(
                    f,
                    "Request({} {}://{}{})",
                    self.method,
                    scheme,
                    host,
                    uri.path()
                );
            }
        }
        f.write_str("Request(Unknown)")
    }
}

impl From<&Request> for Context {
    /// Lets a request stand in as the parent context of a child request.
    /// [`Context::resolved`] flattens the resulting chain.
    fn from(req: &Request) -> Self {
        Context::Request(Arc::new(req.context.clone()))
    }
}
