//! Cursor over LOB data still sitting in the connection's response buffer.

use std::sync::{MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::protocol::buffer::{ReadBuffer, SharedReadBuffer};

/// A single-use cursor over character data that has not been pulled off
/// the response buffer yet.
///
/// The cursor is connection-affine: it stays valid only until the
/// connection advances past the payload and calls
/// [`ReadBuffer::invalidate_cursors`]. After that every access fails with
/// [`Error::Exhausted`], so a value that needs to outlive the current
/// protocol position must be materialized into memory or disk first.
///
/// While the cursor is live the underlying buffer supports repositioning,
/// so reads are expressed as positioned reads and rewinding is free.
#[derive(Debug)]
pub struct StreamCursor {
    buf: SharedReadBuffer,
    /// Generation captured at creation; a mismatch means the connection
    /// has moved on.
    generation: u64,
    /// Byte offset of the payload within the buffer.
    start: usize,
    /// Payload length in characters, as reported by the protocol.
    char_len: u64,
    /// Whether the payload is UCS-2 encoded.
    wide: bool,
}

impl StreamCursor {
    /// Bind a cursor over `char_len` characters starting at byte offset
    /// `start` of the shared buffer.
    pub fn new(buf: SharedReadBuffer, start: usize, char_len: u64, wide: bool) -> Self {
        let generation = lock(&buf).generation();
        Self {
            buf,
            generation,
            start,
            char_len,
            wide,
        }
    }

    /// Protocol-reported length in characters.
    ///
    /// Available without consuming the stream.
    pub fn char_len(&self) -> u64 {
        self.char_len
    }

    /// Whether the underlying buffer can still serve this cursor.
    pub fn is_valid(&self) -> bool {
        lock(&self.buf).generation() == self.generation
    }

    /// Read up to `n` characters starting at character offset `pos`.
    ///
    /// Returns an empty string at or past the end of the payload. Fails
    /// with [`Error::Exhausted`] once the connection has advanced.
    pub fn read_chars_at(&self, pos: u64, n: usize) -> Result<String> {
        let mut buf = lock(&self.buf);
        if buf.generation() != self.generation {
            return Err(Error::Exhausted);
        }
        if pos >= self.char_len {
            return Ok(String::new());
        }

        let n = n.min((self.char_len - pos) as usize);
        let width = if self.wide { 2 } else { 1 };
        buf.set_position(self.start + pos as usize * width)?;
        if self.wide {
            buf.read_ucs2_string(n)
        } else {
            buf.read_ascii_string(n)
        }
    }
}

fn lock(buf: &SharedReadBuffer) -> MutexGuard<'_, ReadBuffer> {
    buf.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_positioned_reads() {
        let buf = ReadBuffer::shared(Bytes::from_static(b"##payload##"));
        let cur = StreamCursor::new(buf, 2, 7, false);
        assert_eq!(cur.read_chars_at(0, 3).unwrap(), "pay");
        assert_eq!(cur.read_chars_at(3, 4).unwrap(), "load");
        // Rewinding a live cursor is allowed.
        assert_eq!(cur.read_chars_at(0, 7).unwrap(), "payload");
        // Reads are clamped at the payload end.
        assert_eq!(cur.read_chars_at(4, 100).unwrap(), "oad");
        assert_eq!(cur.read_chars_at(7, 1).unwrap(), "");
    }

    #[test]
    fn test_wide_reads() {
        // "ab" in UTF-16LE, preceded by a junk byte
        let buf = ReadBuffer::shared(Bytes::from_static(&[0xFF, 0x61, 0x00, 0x62, 0x00]));
        let cur = StreamCursor::new(buf, 1, 2, true);
        assert_eq!(cur.read_chars_at(0, 2).unwrap(), "ab");
        assert_eq!(cur.read_chars_at(1, 1).unwrap(), "b");
    }

    #[test]
    fn test_exhausted_after_invalidate() {
        let buf = ReadBuffer::shared(Bytes::from_static(b"data"));
        let cur = StreamCursor::new(buf.clone(), 0, 4, false);
        assert!(cur.is_valid());

        buf.lock().unwrap().invalidate_cursors();

        assert!(!cur.is_valid());
        assert!(matches!(cur.read_chars_at(0, 4), Err(Error::Exhausted)));
    }
}
