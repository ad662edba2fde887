//! SSE Frame Decoder
//!
//! Splits an arbitrarily chunked byte stream into SSE-style frames and
//! extracts their `data:` field values. The decoder has no knowledge of
//! payload semantics; it only finds frame boundaries and field lines.
//!
//! # Wire Format
//!
//! Frames are separated by a blank line (two consecutive newlines, with
//! `\r\n` line endings tolerated). Within a frame, only lines that start
//! with the `data:` prefix carry payload; everything else is ignored.
//!
//! ```text
//! data: {"token":"Hello"}\n
//! \n
//! data: [DONE]\n
//! \n
//! ```
//!
//! Network chunk boundaries never align with frame boundaries, so the
//! decoder accumulates bytes until a complete frame is available. Frame
//! extraction works on raw bytes and decodes to text per frame, so the
//! emitted values are identical for every possible chunking of the same
//! stream, including one byte at a time.

/// Field prefix that marks a payload line within a frame.
const DATA_PREFIX: &str = "data:";

/// Stateful byte-to-field-value decoder for one event stream.
///
/// One decoder instance serves exactly one stream; it is not restartable.
/// Feed chunks with [`push`](Self::push) and flush the residual with
/// [`finish`](Self::finish) when the byte source ends.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Accumulation buffer holding bytes not yet consumed by a frame
    buffer: Vec<u8>,
    /// Whether the decoder has been flushed
    finished: bool,
}

impl FrameDecoder {
    /// Create a decoder with an empty accumulation buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes, returning the field values of every frame
    /// completed by this chunk, in arrival order.
    ///
    /// A frame with no `data:` lines contributes nothing; a frame with
    /// several contributes each value independently.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        debug_assert!(!self.finished, "push after finish");
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some((at, len)) = find_delimiter(&self.buffer) {
            let frame = String::from_utf8_lossy(&self.buffer[..at]).into_owned();
            self.buffer.drain(..at + len);
            values.extend(field_values(&frame));
        }
        values
    }

    /// Flush the residual buffer when the byte source has ended.
    ///
    /// A stream that ends mid-frame, without a trailing delimiter, still
    /// yields its buffered content as one final frame rather than silently
    /// dropping it.
    pub fn finish(&mut self) -> Vec<String> {
        self.finished = true;
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let frame = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        if frame.trim().is_empty() {
            return Vec::new();
        }
        field_values(&frame)
    }

    /// Number of bytes currently buffered without a complete frame
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Find the earliest frame delimiter in the buffer.
///
/// Returns the byte offset where the frame ends and the delimiter length.
/// Both bare `\n\n` and `\r\n\r\n` are recognized; when both occur the
/// earlier one wins.
fn find_delimiter(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buffer, b"\n\n");
    let crlf = find_subslice(buffer, b"\r\n\r\n");
    match (lf, crlf) {
        (Some(l), Some(c)) if c < l => Some((c, 4)),
        (Some(l), _) => Some((l, 2)),
        (None, Some(c)) => Some((c, 4)),
        (None, None) => None,
    }
}

/// Locate the first occurrence of `needle` within `haystack`
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Extract `data:` field values from one frame's text.
///
/// Lines are trimmed before the prefix check; the value is the remainder
/// after the prefix with one optional leading space removed. Values are
/// returned in the order their lines appeared.
fn field_values(frame: &str) -> Vec<String> {
    let mut values = Vec::new();
    for line in frame.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            let value = rest.strip_prefix(' ').unwrap_or(rest);
            values.push(value.to_string());
        }
    }
    values
}
