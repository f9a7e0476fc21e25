//! One-shot sequential reading over a cyclic object key
//!
//! Remote object handles (see [`ObjectKey`]) are allowed to restart from
//! byte zero when read again after a close — useful for retry-style access
//! patterns, disastrous for a file-like consumer that would silently receive
//! the whole object a second time after EOF. [`SequentialReader`] wraps such
//! a key and enforces at most one full read-through: once it is finished, no
//! further bytes are ever requested from the backend, and only content
//! already buffered may still be drained.

use std::collections::VecDeque;
use std::fmt;
use std::io;

use bytes::Bytes;
use encoding_rs::{Decoder, Encoding, UTF_8};

/// Chunk size for backend reads while assembling lines.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// A remote object handle with cyclic read semantics.
///
/// `read` returns the next chunk of the current pass; an empty chunk means
/// the pass is exhausted. After `close`, implementations are permitted (and
/// the S3 backend does exactly this) to serve the next `read` from byte zero
/// again. [`SequentialReader`] exists to suppress that restart.
pub trait ObjectKey: Send {
    /// Read the next chunk of at most `len` bytes from the current pass.
    ///
    /// Backends may return shorter (or, for transport-framed streams,
    /// slightly longer) chunks; an empty chunk signals end of the pass.
    fn read(&mut self, len: usize) -> io::Result<Bytes>;

    /// Release transport resources held by the current pass.
    fn close(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Backend reads are still allowed.
    Reading,
    /// Terminal: no further backend reads, only buffered content drains.
    Finished,
}

/// Forward-only, line-oriented reader over an [`ObjectKey`].
///
/// Bytes are decoded incrementally with the configured encoding (UTF-8 by
/// default, with replacement for invalid sequences), split on `\n`, and
/// handed out newline-stripped via [`readline`](Self::readline) or
/// iteration. Closing is idempotent and also happens on drop.
pub struct SequentialReader {
    key: Box<dyn ObjectKey>,
    state: ReadState,
    encoding: &'static Encoding,
    decoder: Decoder,
    /// Trailing fragment not yet terminated by a newline.
    buffer: String,
    /// Complete, newline-free records in arrival order.
    lines: VecDeque<String>,
}

impl SequentialReader {
    /// Wrap a key, decoding with `encoding` (UTF-8 when `None`).
    pub fn new(key: Box<dyn ObjectKey>, encoding: Option<&'static Encoding>) -> Self {
        let encoding = encoding.unwrap_or(UTF_8);
        Self {
            key,
            state: ReadState::Reading,
            encoding,
            decoder: encoding.new_decoder(),
            buffer: String::new(),
            lines: VecDeque::new(),
        }
    }

    /// The encoding applied to backend chunks.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Read a raw chunk of at most `len` bytes.
    ///
    /// Once finished, returns empty bytes immediately without touching the
    /// backend, so a closed reader can never trigger the backend's
    /// restart-from-zero behavior.
    pub fn read(&mut self, len: usize) -> io::Result<Bytes> {
        if self.state == ReadState::Finished {
            return Ok(Bytes::new());
        }
        self.key.read(len)
    }

    /// Stop reading and release the backend.
    ///
    /// The finished flag is flipped before delegating so that a close
    /// failure still leaves the reader terminal. Idempotent. The decoder is
    /// flushed on the first close so that a truncated multi-byte sequence at
    /// the end of the stream surfaces as a replacement character instead of
    /// disappearing.
    pub fn close(&mut self) -> io::Result<()> {
        if self.state == ReadState::Reading {
            self.flush_decoder();
        }
        self.state = ReadState::Finished;
        self.key.close()
    }

    /// Whether the reader supports seeking. It never does; downstream
    /// decompression layers probe this before choosing a buffering strategy.
    pub fn seekable(&self) -> bool {
        false
    }

    /// Return the next complete line, newline-stripped.
    ///
    /// `Ok(None)` signals end of sequence: both the pending lines and the
    /// trailing fragment are exhausted. The trailing fragment is returned
    /// exactly once when the backend is done.
    pub fn readline(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Ok(Some(line));
            }
            if self.state == ReadState::Finished {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buffer)));
            }

            let chunk = self.read(READ_CHUNK_SIZE)?;
            if chunk.is_empty() {
                // End of the object: seal the reader before the backend can
                // cycle back to byte zero, then drain what is buffered.
                self.close()?;
                continue;
            }
            self.decode_into_buffer(&chunk);
            self.split_buffer();
        }
    }

    fn decode_into_buffer(&mut self, chunk: &[u8]) {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(chunk.len())
            .unwrap_or(chunk.len() * 4);
        let mut decoded = String::with_capacity(capacity);
        // Replacement decode; a stateful decoder keeps multi-byte sequences
        // split across chunk boundaries intact.
        let _ = self
            .decoder
            .decode_to_string(chunk, &mut decoded, false);
        self.buffer.push_str(&decoded);
    }

    /// Signal end of stream to the decoder, emitting replacement characters
    /// for any bytes still pending inside it. Must run at most once; the
    /// `Reading` check in `close` guarantees that.
    fn flush_decoder(&mut self) {
        let capacity = self.decoder.max_utf8_buffer_length(0).unwrap_or(4);
        let mut tail = String::with_capacity(capacity);
        let _ = self.decoder.decode_to_string(&[], &mut tail, true);
        self.buffer.push_str(&tail);
    }

    fn split_buffer(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let rest = self.buffer.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buffer, rest);
            line.pop();
            self.lines.push_back(line);
        }
    }
}

impl Iterator for SequentialReader {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.readline().transpose()
    }
}

impl Drop for SequentialReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for SequentialReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialReader")
            .field("state", &self.state)
            .field("encoding", &self.encoding.name())
            .field("buffered_lines", &self.lines.len())
            .field("buffered_fragment", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Stub key that serves fixed chunks and counts backend calls.
    struct StubKey {
        chunks: VecDeque<Bytes>,
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl StubKey {
        fn new(chunks: Vec<&'static [u8]>) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let closes = Arc::new(AtomicUsize::new(0));
            let key = Self {
                chunks: chunks.into_iter().map(Bytes::from_static).collect(),
                reads: reads.clone(),
                closes: closes.clone(),
            };
            (key, reads, closes)
        }
    }

    impl ObjectKey for StubKey {
        fn read(&mut self, _len: usize) -> io::Result<Bytes> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.chunks.pop_front().unwrap_or_default())
        }

        fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn reader_over(chunks: Vec<&'static [u8]>) -> SequentialReader {
        let (key, _, _) = StubKey::new(chunks);
        SequentialReader::new(Box::new(key), None)
    }

    #[test]
    fn test_readline_reassembles_lines_across_chunks() {
        // Arbitrary split point in the middle of a record
        let mut reader = reader_over(vec![b"a\nb", b"b\nccc"]);

        assert_eq!(reader.readline().unwrap().as_deref(), Some("a"));
        assert_eq!(reader.readline().unwrap().as_deref(), Some("bb"));
        assert_eq!(reader.readline().unwrap().as_deref(), Some("ccc"));
        assert_eq!(reader.readline().unwrap(), None);
        // Stays exhausted
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_trailing_fragment_returned_exactly_once() {
        let mut reader = reader_over(vec![b"one\ntwo"]);
        assert_eq!(reader.readline().unwrap().as_deref(), Some("one"));
        assert_eq!(reader.readline().unwrap().as_deref(), Some("two"));
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_trailing_newline_yields_no_phantom_line() {
        let mut reader = reader_over(vec![b"one\ntwo\n"]);
        assert_eq!(reader.readline().unwrap().as_deref(), Some("one"));
        assert_eq!(reader.readline().unwrap().as_deref(), Some("two"));
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_empty_object() {
        let mut reader = reader_over(vec![]);
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_iteration_matches_readline() {
        let reader = reader_over(vec![b"x\ny\nz"]);
        let lines: Vec<String> = reader.map(Result::unwrap).collect();
        assert_eq!(lines, ["x", "y", "z"]);
    }

    #[test]
    fn test_one_shot_after_close() {
        let (key, reads, _) = StubKey::new(vec![b"never served"]);
        let mut reader = SequentialReader::new(Box::new(key), None);

        reader.close().unwrap();
        let chunk = reader.read(READ_CHUNK_SIZE).unwrap();
        assert!(chunk.is_empty());
        assert_eq!(reads.load(Ordering::SeqCst), 0, "backend must not be touched");
        assert_eq!(reader.readline().unwrap(), None);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_is_idempotent_and_delegates() {
        let (key, _, closes) = StubKey::new(vec![]);
        let mut reader = SequentialReader::new(Box::new(key), None);
        reader.close().unwrap();
        reader.close().unwrap();
        // Delegation happens on every close call
        assert!(closes.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_buffered_content_drains_after_close() {
        let mut reader = reader_over(vec![b"head\ntail-fragment"]);
        assert_eq!(reader.readline().unwrap().as_deref(), Some("head"));
        // "tail-fragment" now sits in the buffer; closing must not lose it
        reader.close().unwrap();
        assert_eq!(reader.readline().unwrap().as_deref(), Some("tail-fragment"));
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_eof_closes_backend() {
        let (key, _, closes) = StubKey::new(vec![b"only\n"]);
        let mut reader = SequentialReader::new(Box::new(key), None);
        assert_eq!(reader.readline().unwrap().as_deref(), Some("only"));
        assert_eq!(reader.readline().unwrap(), None);
        assert!(closes.load(Ordering::SeqCst) >= 1, "EOF must close the key");
    }

    #[test]
    fn test_multibyte_sequence_split_across_chunks() {
        // "é" (0xC3 0xA9) split between two chunks
        let mut reader = reader_over(vec![b"caf\xc3", b"\xa9\nau lait"]);
        assert_eq!(reader.readline().unwrap().as_deref(), Some("café"));
        assert_eq!(reader.readline().unwrap().as_deref(), Some("au lait"));
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_truncated_multibyte_at_eof_becomes_replacement() {
        // Object ends mid-sequence: the dangling 0xC3 must surface as
        // U+FFFD, not vanish inside the decoder
        let mut reader = reader_over(vec![b"ok\ncaf\xc3"]);
        assert_eq!(reader.readline().unwrap().as_deref(), Some("ok"));
        assert_eq!(reader.readline().unwrap().as_deref(), Some("caf\u{fffd}"));
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_close_flushes_pending_decoder_bytes() {
        let mut reader = reader_over(vec![b"caf\xc3", b"never reached"]);
        // Pull the first chunk into the buffer, then close early
        let chunk = reader.read(READ_CHUNK_SIZE).unwrap();
        reader.decode_into_buffer(&chunk);
        reader.close().unwrap();
        assert_eq!(reader.readline().unwrap().as_deref(), Some("caf\u{fffd}"));
        assert_eq!(reader.readline().unwrap(), None);
    }

    #[test]
    fn test_explicit_encoding() {
        let (key, _, _) = StubKey::new(vec![b"caf\xe9\n"]);
        let mut reader =
            SequentialReader::new(Box::new(key), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(reader.encoding().name(), "windows-1252");
        assert_eq!(reader.readline().unwrap().as_deref(), Some("café"));
    }

    #[test]
    fn test_not_seekable() {
        let reader = reader_over(vec![]);
        assert!(!reader.seekable());
    }

    #[test]
    fn test_carriage_returns_are_preserved() {
        // Only \n is a record separator; \r stays with the line
        let mut reader = reader_over(vec![b"a\r\nb"]);
        assert_eq!(reader.readline().unwrap().as_deref(), Some("a\r"));
        assert_eq!(reader.readline().unwrap().as_deref(), Some("b"));
    }
}
