//! Request and response capture.
//!
//! An inbound request body is a stream that can be consumed exactly once,
//! yet the logging stage, both inspectors, and the application handler each
//! need to read it. [`capture_request`] drains the stream a single time into
//! a [`CapturedBody`]; every later reader gets a fresh view over the same
//! immutable bytes.
//!
//! On the way out, handlers and stages write into a [`ResponseBuffer`] (or
//! return a [`CapturedResponse`] directly). Nothing touches the real output
//! until [`flush`] copies the buffered bytes into the outbound response.
//! `flush` takes its argument by value, so one response can only be flushed
//! once.
//!
//! # Example
//!
//! ```
//! use bulwark_core::capture::{capture_request, BodyCapture, CaptureLimits};
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use std::io::Read;
//!
//! # tokio_test::block_on(async {
//! let request = http::Request::post("/login")
//!     .body(Full::new(Bytes::from("user=alice")))
//!     .unwrap();
//!
//! let captured = capture_request(request, CaptureLimits::unlimited()).await.unwrap();
//!
//! let mut first = String::new();
//! captured.body().reader().read_to_string(&mut first).unwrap();
//! assert_eq!(first, captured.body_text());
//! # });
//! ```

use crate::error::{BoxError, CaptureError};
use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use std::borrow::Cow;
use std::io::Cursor;

/// A request whose body has been captured.
pub type CapturedRequest = http::Request<CapturedBody>;

/// A response whose body is buffered in memory and not yet flushed.
pub type CapturedResponse = http::Response<CapturedBody>;

/// The outbound response produced by [`flush`].
pub type FlushedResponse = http::Response<Full<Bytes>>;

/// An immutable, replayable body.
///
/// Cloning is cheap: clones share the same underlying buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedBody {
    bytes: Bytes,
}

impl CapturedBody {
    /// Creates a captured body from bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Creates an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a fresh reader positioned at the start of the body.
    ///
    /// Every call returns an independent reader; reading one does not
    /// advance any other.
    #[must_use]
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.bytes.clone())
    }

    /// Returns a fresh HTTP body over the same bytes.
    #[must_use]
    pub fn stream(&self) -> Full<Bytes> {
        Full::new(self.bytes.clone())
    }

    /// Decodes the body as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consumes the body, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Returns the body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Bytes> for CapturedBody {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl From<String> for CapturedBody {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&'static str> for CapturedBody {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for CapturedBody {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

/// Read access to a captured body.
///
/// The logging stage and the inspectors only depend on this trait, so the
/// body is captured once per request and shared by every reader.
pub trait BodyCapture {
    /// Returns the captured body.
    fn captured(&self) -> &CapturedBody;

    /// Returns the captured body decoded as text.
    fn body_text(&self) -> Cow<'_, str> {
        self.captured().text()
    }
}

impl BodyCapture for CapturedRequest {
    fn captured(&self) -> &CapturedBody {
        self.body()
    }
}

impl BodyCapture for CapturedResponse {
    fn captured(&self) -> &CapturedBody {
        self.body()
    }
}

impl BodyCapture for CapturedBody {
    fn captured(&self) -> &CapturedBody {
        self
    }
}

/// Limits applied while draining a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureLimits {
    max_body_bytes: Option<usize>,
}

impl CaptureLimits {
    /// No limit on body size.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_body_bytes: None,
        }
    }

    /// Rejects bodies larger than `limit` bytes.
    #[must_use]
    pub const fn with_max_body_bytes(limit: usize) -> Self {
        Self {
            max_body_bytes: Some(limit),
        }
    }

    /// Returns the configured byte limit, if any.
    #[must_use]
    pub const fn max_body_bytes(&self) -> Option<usize> {
        self.max_body_bytes
    }
}

/// Drains the request body once and replaces it with a [`CapturedBody`].
///
/// # Errors
///
/// Returns [`CaptureError::Drain`] if the underlying stream fails and
/// [`CaptureError::TooLarge`] if the body exceeds `limits`.
pub async fn capture_request<B>(
    request: http::Request<B>,
    limits: CaptureLimits,
) -> Result<CapturedRequest, CaptureError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (parts, body) = request.into_parts();
    let bytes = drain(body, limits).await?;
    Ok(http::Request::from_parts(parts, CapturedBody::new(bytes)))
}

/// Drains a response body produced by a streaming handler.
///
/// # Errors
///
/// Same as [`capture_request`].
pub async fn capture_response<B>(
    response: http::Response<B>,
    limits: CaptureLimits,
) -> Result<CapturedResponse, CaptureError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();
    let bytes = drain(body, limits).await?;
    Ok(http::Response::from_parts(parts, CapturedBody::new(bytes)))
}

async fn drain<B>(body: B, limits: CaptureLimits) -> Result<Bytes, CaptureError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match limits.max_body_bytes {
        Some(limit) => Limited::new(body, limit)
            .collect()
            .await
            .map(http_body_util::Collected::to_bytes)
            .map_err(|err| {
                if err.is::<LengthLimitError>() {
                    CaptureError::TooLarge { limit }
                } else {
                    CaptureError::Drain(err)
                }
            }),
        None => body
            .collect()
            .await
            .map(http_body_util::Collected::to_bytes)
            .map_err(CaptureError::drain),
    }
}

/// Copies a buffered response into the real outbound response.
///
/// `Content-Length` is set from the buffered body.
#[must_use]
pub fn flush(response: CapturedResponse) -> FlushedResponse {
    let (mut parts, body) = response.into_parts();
    let bytes = body.into_bytes();
    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    http::Response::from_parts(parts, Full::new(bytes))
}

/// An in-memory response under construction.
///
/// Writes go to an internal buffer rather than the connection. The buffer
/// can be inspected with [`body_text`](Self::body_text), discarded with
/// [`reset_buffer`](Self::reset_buffer), and finally turned into a
/// [`CapturedResponse`] with [`finish`](Self::finish).
///
/// # Example
///
/// ```
/// use bulwark_core::capture::ResponseBuffer;
/// use std::fmt::Write;
///
/// let mut buffer = ResponseBuffer::new();
/// write!(buffer, "hello {}", "world").unwrap();
/// assert_eq!(buffer.body_text(), "hello world");
///
/// let response = buffer.finish();
/// assert_eq!(response.body().len(), 11);
/// ```
#[derive(Debug)]
pub struct ResponseBuffer {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuffer {
    /// Creates an empty `200 OK` buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
        }
    }

    /// Creates an empty buffer with the given status.
    #[must_use]
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::new()
        }
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Appends bytes to the body.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Returns the buffered body decoded as text.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Returns the number of buffered body bytes.
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Clears status, headers, and body.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
    }

    /// Clears only the body.
    pub fn reset_buffer(&mut self) {
        self.body.clear();
    }

    /// Freezes the buffer into a [`CapturedResponse`].
    #[must_use]
    pub fn finish(self) -> CapturedResponse {
        let mut response = http::Response::new(CapturedBody::new(self.body.freeze()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl std::io::Write for ResponseBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    // Buffered output only reaches the client through `capture::flush`.
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Write for ResponseBuffer {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::StreamBody;
    use http_body::Frame;
    use proptest::prelude::*;
    use std::io::Read;

    fn read_all(body: &CapturedBody) -> Vec<u8> {
        let mut out = Vec::new();
        body.reader().read_to_end(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn test_capture_request_keeps_parts() {
        let request = http::Request::builder()
            .method("PUT")
            .uri("/items/7?x=1")
            .header("x-custom", "yes")
            .body(Full::new(Bytes::from("payload")))
            .unwrap();

        let captured = capture_request(request, CaptureLimits::unlimited())
            .await
            .unwrap();

        assert_eq!(captured.method(), http::Method::PUT);
        assert_eq!(captured.uri().query(), Some("x=1"));
        assert_eq!(captured.headers()["x-custom"], "yes");
        assert_eq!(captured.body_text(), "payload");
    }

    #[tokio::test]
    async fn test_stream_is_fresh_each_time() {
        let body = CapturedBody::from("abc");
        let first = body.stream().collect().await.unwrap().to_bytes();
        let second = body.stream().collect().await.unwrap().to_bytes();
        assert_eq!(first, second);
        assert_eq!(first, Bytes::from("abc"));
    }

    #[tokio::test]
    async fn test_drain_failure_aborts_capture() {
        let frames: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from("partial"))),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer went away")),
        ];
        let body = StreamBody::new(futures_util::stream::iter(frames));
        let request = http::Request::post("/").body(body).unwrap();

        let err = capture_request(request, CaptureLimits::unlimited())
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::Drain(_)));
        assert!(err.to_string().contains("peer went away"));
    }

    #[tokio::test]
    async fn test_limit_rejects_large_body() {
        let request = http::Request::post("/")
            .body(Full::new(Bytes::from(vec![b'a'; 64])))
            .unwrap();

        let err = capture_request(request, CaptureLimits::with_max_body_bytes(10))
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::TooLarge { limit: 10 }));
    }

    #[tokio::test]
    async fn test_limit_accepts_body_at_limit() {
        let request = http::Request::post("/")
            .body(Full::new(Bytes::from(vec![b'a'; 10])))
            .unwrap();

        let captured = capture_request(request, CaptureLimits::with_max_body_bytes(10))
            .await
            .unwrap();
        assert_eq!(captured.body().len(), 10);
    }

    #[tokio::test]
    async fn test_capture_response() {
        let response = http::Response::builder()
            .status(StatusCode::CREATED)
            .body(Full::new(Bytes::from("{\"id\":1}")))
            .unwrap();

        let captured = capture_response(response, CaptureLimits::unlimited())
            .await
            .unwrap();
        assert_eq!(captured.status(), StatusCode::CREATED);
        assert_eq!(captured.body_text(), "{\"id\":1}");
    }

    #[test]
    fn test_text_is_lossy() {
        let body = CapturedBody::from(vec![b'o', b'k', 0xff]);
        assert_eq!(body.text(), "ok\u{fffd}");
    }

    #[test]
    fn test_buffer_reset_semantics() {
        let mut buffer = ResponseBuffer::with_status(StatusCode::ACCEPTED);
        buffer.set_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        );
        buffer.write_bytes(b"draft");

        buffer.reset_buffer();
        assert_eq!(buffer.body_len(), 0);
        assert_eq!(buffer.status(), StatusCode::ACCEPTED);
        assert!(buffer.headers().contains_key(http::header::CONTENT_TYPE));

        buffer.write_bytes(b"final");
        buffer.reset();
        assert_eq!(buffer.body_len(), 0);
        assert_eq!(buffer.status(), StatusCode::OK);
        assert!(buffer.headers().is_empty());
    }

    #[test]
    fn test_io_write_appends() {
        use std::io::Write;

        let mut buffer = ResponseBuffer::new();
        buffer.write_all(b"one ").unwrap();
        buffer.write_all(b"two").unwrap();
        buffer.flush().unwrap();
        assert_eq!(buffer.body_text(), "one two");
    }

    #[tokio::test]
    async fn test_flush_copies_buffer_and_sets_length() {
        let mut buffer = ResponseBuffer::with_status(StatusCode::NOT_FOUND);
        buffer.write_bytes(b"missing");
        let flushed = flush(buffer.finish());

        assert_eq!(flushed.status(), StatusCode::NOT_FOUND);
        assert_eq!(flushed.headers()[CONTENT_LENGTH], "7");
        let bytes = flushed.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from("missing"));
    }

    proptest! {
        #[test]
        fn prop_replay_is_idempotent(data in proptest::collection::vec(any::<u8>(), 0..2048), reads in 1usize..8) {
            let body = CapturedBody::from(data.clone());
            for _ in 0..reads {
                prop_assert_eq!(read_all(&body), data.clone());
            }
            prop_assert_eq!(body.as_bytes().as_ref(), data.as_slice());
        }
    }
}
