use bytes::BytesMut;

use crate::codec::{decode_response, Response, ResponseShape, DEFAULT_MAX_LINE};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 64;

/// Accumulates bytes from partial reads until a complete response is present.
///
/// Partial data is buffered, never interpreted. Callers feed whatever the
/// transport returned and ask for a response after each chunk.
#[derive(Debug)]
pub struct ResponseBuffer {
    buf: BytesMut,
    max_line: usize,
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// Create a buffer that rejects unterminated lines longer than `max_line`.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_line,
        }
    }

    /// Append received bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Try to decode one response of the given shape.
    ///
    /// Returns `Ok(None)` while the response is still incomplete.
    pub fn try_decode(&mut self, shape: ResponseShape) -> Result<Option<Response>> {
        decode_response(&mut self.buf, shape, self.max_line)
    }

    /// Bytes received but not consumed by a decoded response.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
