//! Message body handling: the replay buffer, the opaque one-shot stream, and
//! the conversion between them.
//!
//! An HTTP body is in general a one-shot readable stream: once consumed or
//! closed it can never be read again. [`Body`] models exactly two cases — an
//! in-memory [`ReplayBuffer`] that can be read any number of times and
//! appended to, and an [`OpaqueStream`] installed by a caller. All write and
//! replayable-read operations funnel through [`Body::write`] and
//! [`Body::read_all`], which convert an opaque stream into a buffer at most
//! once, closing the original stream exactly once in the process.

use std::fmt;
use std::io::{self, Read, Write};

use bytes::Bytes;
use tracing::{debug, warn};

/// A readable body source with an explicit close.
///
/// Close errors are treated as best-effort by the body machinery: they are
/// logged and swallowed, and `close` is never invoked more than once per
/// stream instance.
pub trait BodyStream: Read + Send {
    /// Releases the underlying resource.
    fn close(&mut self) -> io::Result<()>;
}

/// Adapter giving any plain reader a no-op close.
pub struct NoopClose<R>(pub R);

impl<R: Read + Send> Read for NoopClose<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Send> BodyStream for NoopClose<R> {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Replay Buffer
// =============================================================================

/// An append-only in-memory body with an independent read cursor.
///
/// Consuming reads advance the cursor; [`ReplayBuffer::bytes`] always returns
/// the full accumulated sequence regardless of cursor position, which is what
/// makes a buffered body replayable. Appended bytes are retained for the life
/// of the buffer.
#[derive(Debug, Default)]
pub struct ReplayBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl ReplayBuffer {
    /// Creates an empty buffer.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The full accumulated contents, independent of the read cursor.
    #[inline]
    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    /// Total bytes accumulated (not bytes remaining to read).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Closing a buffer is a no-op; memory is reclaimed by ownership.
    #[inline]
    pub fn close(&mut self) {}

    /// Everything from the cursor to the end, advancing the cursor past it.
    fn take_remaining(&mut self) -> Bytes {
        let out = Bytes::copy_from_slice(&self.data[self.cursor..]);
        self.cursor = self.data.len();
        out
    }
}

impl Write for ReplayBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for ReplayBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }
}

// =============================================================================
// Opaque one-shot stream
// =============================================================================

/// A caller-installed read/close-only body.
///
/// The inner stream is taken out on close, which guarantees close runs at
/// most once and that a closed stream can never be read again.
pub struct OpaqueStream {
    inner: Option<Box<dyn BodyStream>>,
}

impl OpaqueStream {
    fn new(stream: Box<dyn BodyStream>) -> Self {
        Self {
            inner: Some(stream),
        }
    }

    fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(stream) => stream.read_to_end(out),
            None => Err(closed_error()),
        }
    }

    /// Closes the stream, at most once. Close errors are logged, not raised.
    fn close(&mut self) {
        if let Some(mut stream) = self.inner.take() {
            if let Err(e) = stream.close() {
                debug!(error = %e, "closing body stream failed");
            }
        }
    }
}

impl fmt::Debug for OpaqueStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueStream")
            .field("closed", &self.inner.is_none())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "body stream already closed")
}

// =============================================================================
// Body
// =============================================================================

/// A request body: either a replayable buffer or an opaque one-shot stream.
pub enum Body {
    /// In-memory buffer: readable any number of times, appendable.
    Buffer(ReplayBuffer),
    /// One-shot readable stream: consumed at most once, then closed.
    Stream(OpaqueStream),
}

impl Body {
    /// An empty buffer body, the state every request starts in.
    #[inline]
    pub fn empty() -> Self {
        Body::Buffer(ReplayBuffer::new())
    }

    /// A body over a one-shot stream with an explicit close.
    pub fn from_stream(stream: impl BodyStream + 'static) -> Self {
        Body::Stream(OpaqueStream::new(Box::new(stream)))
    }

    /// A body over a plain reader (no close side effect).
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::from_stream(NoopClose(reader))
    }

    #[inline]
    pub fn is_buffer(&self) -> bool {
        matches!(self, Body::Buffer(_))
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    /// Appends to the body.
    ///
    /// A buffer takes the write directly. An opaque stream is first converted
    /// to a buffer (see [`Body::read_all`] with `consume = false` for the
    /// same conversion); its full content ends up ahead of the new bytes.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.as_buffer()?.write(buf)
    }

    /// Fully reads the body.
    ///
    /// With `consume = true` the current body is read to the end and closed
    /// in place, whatever its variant; it is exhausted afterwards and is not
    /// replaced. With `consume = false` the full contents are returned while
    /// keeping the body replayable: a buffer is read without disturbing its
    /// cursor, and an opaque stream is drained into a buffer that takes its
    /// place for all future operations.
    pub fn read_all(&mut self, consume: bool) -> io::Result<Bytes> {
        if consume {
            return match self {
                Body::Buffer(buf) => {
                    let out = buf.take_remaining();
                    buf.close();
                    Ok(out)
                }
                Body::Stream(stream) => {
                    let mut out = Vec::new();
                    let result = stream.read_to_end(&mut out);
                    stream.close();
                    result?;
                    Ok(Bytes::from(out))
                }
            };
        }
        Ok(ReplayBuffer::bytes(self.as_buffer()?))
    }

    /// Returns the body as a buffer, converting an opaque stream at most once.
    ///
    /// The conversion drains the stream into a fresh buffer and closes the
    /// original exactly once; the stream is never readable again afterwards.
    /// A drain error is terminal for the original content: the bytes captured
    /// before the failure stay in the installed buffer and the error is
    /// returned, since the source is unrecoverable.
    fn as_buffer(&mut self) -> io::Result<&mut ReplayBuffer> {
        if let Body::Stream(stream) = self {
            let mut buf = ReplayBuffer::new();
            let result = stream.read_to_end(&mut buf.data);
            stream.close();
            let captured = buf.data.len();
            *self = Body::Buffer(buf);
            match result {
                Ok(_) => {
                    debug!(bytes = captured, "replaced one-shot body stream with replay buffer");
                }
                Err(e) => {
                    warn!(
                        bytes_captured = captured,
                        error = %e,
                        "draining one-shot body stream failed; original content lost"
                    );
                    return Err(e);
                }
            }
        }
        match self {
            Body::Buffer(buf) => Ok(buf),
            Body::Stream(_) => Err(closed_error()),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Buffer(buf) => f.debug_tuple("Buffer").field(buf).finish(),
            Body::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

// =============================================================================
// Counting writer
// =============================================================================

/// Pass-through writer that counts bytes accepted by the destination.
///
/// The count is monotonic and never resets; it measures payload size without
/// buffering the payload separately.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Total bytes accepted by the destination so far.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Stream over fixed content that records how many times it was closed.
    struct TrackedStream {
        data: Cursor<Vec<u8>>,
        closes: Arc<AtomicUsize>,
    }

    impl TrackedStream {
        fn new(content: &[u8]) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    data: Cursor::new(content.to_vec()),
                    closes: closes.clone(),
                },
                closes,
            )
        }
    }

    impl Read for TrackedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl BodyStream for TrackedStream {
        fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Stream that yields some bytes and then fails.
    struct FailingStream {
        data: Cursor<Vec<u8>>,
        closes: Arc<AtomicUsize>,
    }

    impl Read for FailingStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream torn")),
                n => Ok(n),
            }
        }
    }

    impl BodyStream for FailingStream {
        fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_replay_buffer_write_then_replay() {
        let mut buf = ReplayBuffer::new();
        buf.write_all(b"hello ").unwrap();
        buf.write_all(b"world").unwrap();

        assert_eq!(ReplayBuffer::bytes(&buf), Bytes::from_static(b"hello world"));
        // Replayable view does not consume.
        assert_eq!(ReplayBuffer::bytes(&buf), Bytes::from_static(b"hello world"));
        assert_eq!(buf.len(), 11);
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_replay_buffer_cursor_independent_of_bytes() {
        let mut buf = ReplayBuffer::new();
        buf.write_all(b"abcdef").unwrap();

        let mut first = [0u8; 3];
        buf.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"abc");

        // Full view unaffected by the cursor; consuming read picks up after it.
        assert_eq!(ReplayBuffer::bytes(&buf), Bytes::from_static(b"abcdef"));
        assert_eq!(buf.take_remaining(), Bytes::from_static(b"def"));
        assert_eq!(buf.take_remaining(), Bytes::new());
    }

    #[test]
    fn test_body_write_then_replayable_read_idempotent() {
        let mut body = Body::empty();
        body.write(b"payload").unwrap();

        assert_eq!(body.read_all(false).unwrap(), Bytes::from_static(b"payload"));
        assert_eq!(body.read_all(false).unwrap(), Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_consuming_read_of_stream_closes_once() {
        let (stream, closes) = TrackedStream::new(b"one shot");
        let mut body = Body::from_stream(stream);

        assert_eq!(body.read_all(true).unwrap(), Bytes::from_static(b"one shot"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(body.is_stream());
    }

    #[test]
    fn test_replayable_read_converts_stream() {
        let (stream, closes) = TrackedStream::new(b"one shot");
        let mut body = Body::from_stream(stream);

        assert_eq!(body.read_all(false).unwrap(), Bytes::from_static(b"one shot"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(body.is_buffer());

        // The body is durable now: consuming and replayable reads both work.
        assert_eq!(body.read_all(false).unwrap(), Bytes::from_static(b"one shot"));
        assert_eq!(body.read_all(true).unwrap(), Bytes::from_static(b"one shot"));
    }

    #[test]
    fn test_write_drains_stream_before_appending() {
        let (stream, closes) = TrackedStream::new(b"drained");
        let mut body = Body::from_stream(stream);

        body.write(b"+new").unwrap();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(body.read_all(false).unwrap(), Bytes::from_static(b"drained+new"));
    }

    #[test]
    fn test_drain_failure_is_terminal_but_closes_stream() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut body = Body::from_stream(FailingStream {
            data: Cursor::new(b"parti".to_vec()),
            closes: closes.clone(),
        });

        let err = body.write(b"more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // The partial capture stays in the installed buffer.
        assert!(body.is_buffer());
        assert_eq!(body.read_all(false).unwrap(), Bytes::from_static(b"parti"));
    }

    #[test]
    fn test_consuming_read_of_closed_stream_errors() {
        let (stream, _closes) = TrackedStream::new(b"gone");
        let mut body = Body::from_stream(stream);

        body.read_all(true).unwrap();
        assert!(body.read_all(true).is_err());
    }

    #[test]
    fn test_counting_writer() {
        let mut sink = CountingWriter::new(Vec::new());
        sink.write_all(b"12345").unwrap();
        sink.write_all(b"678").unwrap();

        assert_eq!(sink.count(), 8);
        assert_eq!(sink.into_inner(), b"12345678".to_vec());
    }

    #[test]
    fn test_from_reader_noop_close() {
        let mut body = Body::from_reader(Cursor::new(b"plain".to_vec()));
        assert_eq!(body.read_all(false).unwrap(), Bytes::from_static(b"plain"));
        assert!(body.is_buffer());
    }
}
