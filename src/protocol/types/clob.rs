//! CLOB values decoded from TEXT/NTEXT columns.
//!
//! A value keeps its content in exactly one of three backings: an
//! in-memory string, an exclusively owned temporary file, or a cursor
//! over data still sitting in the connection's response buffer. Values
//! start out in memory and spill to disk once they outgrow the
//! connection's LOB buffer size; a stream-backed value must be
//! materialized before the connection moves past its payload.

use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::connection::ConnectionContext;
use crate::error::{Error, Result};
use crate::protocol::constants::LOB_CHUNK_SIZE;
use crate::protocol::types::stream::StreamCursor;
use crate::protocol::types::writer::ClobWriter;

/// Which backing currently holds a value's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingKind {
    /// Content held in an in-memory string.
    Memory,
    /// Content spilled to a temporary file.
    Disk,
    /// Content not yet pulled off the connection's response buffer.
    Stream,
}

/// Storage backing for a CLOB value. Exactly one is active at a time.
#[derive(Debug)]
pub(crate) enum ClobBacking {
    /// In-memory text.
    Memory(String),
    /// Temporary file holding one byte per character. The file is
    /// exclusively owned and deleted when the backing is dropped.
    Disk(NamedTempFile),
    /// Live cursor over the response buffer; single-use.
    Stream(StreamCursor),
}

impl ClobBacking {
    /// Number of characters currently available.
    ///
    /// Never materializes the content: disk length comes from file
    /// metadata, stream length from the protocol-reported size.
    pub(crate) fn char_len(&self) -> Result<u64> {
        match self {
            ClobBacking::Memory(text) => Ok(text.chars().count() as u64),
            ClobBacking::Disk(tmp) => Ok(tmp.as_file().metadata()?.len()),
            ClobBacking::Stream(cur) => {
                if cur.is_valid() {
                    Ok(cur.char_len())
                } else {
                    Err(Error::Exhausted)
                }
            }
        }
    }

    /// Read up to `n` characters starting at character offset `pos`.
    pub(crate) fn read_chars_at(&self, pos: u64, n: usize) -> Result<String> {
        match self {
            ClobBacking::Memory(text) => {
                Ok(text.chars().skip(pos as usize).take(n).collect())
            }
            ClobBacking::Disk(tmp) => {
                let mut file = tmp.as_file();
                file.seek(SeekFrom::Start(pos))?;
                let mut raw = Vec::with_capacity(n);
                file.take(n as u64).read_to_end(&mut raw)?;
                Ok(String::from_utf8_lossy(&raw).into_owned())
            }
            ClobBacking::Stream(cur) => cur.read_chars_at(pos, n),
        }
    }

    fn kind(&self) -> BackingKind {
        match self {
            ClobBacking::Memory(_) => BackingKind::Memory,
            ClobBacking::Disk(_) => BackingKind::Disk,
            ClobBacking::Stream(_) => BackingKind::Stream,
        }
    }
}

pub(crate) struct ClobInner {
    pub(crate) backing: ClobBacking,
}

/// A character large object decoded from a TEXT/NTEXT column or built
/// client-side for sending.
///
/// All mutating operations take the value's internal lock, so concurrent
/// callers block rather than interleave. Cloning shares the underlying
/// value.
#[derive(Clone)]
pub struct ClobValue {
    ctx: Arc<ConnectionContext>,
    inner: Arc<Mutex<ClobInner>>,
}

impl ClobValue {
    /// Build a value from literal text, used when the client sends a CLOB.
    pub fn from_string(ctx: Arc<ConnectionContext>, text: impl Into<String>) -> Self {
        Self {
            ctx,
            inner: Arc::new(Mutex::new(ClobInner {
                backing: ClobBacking::Memory(text.into()),
            })),
        }
    }

    /// Build an empty value.
    pub fn empty(ctx: Arc<ConnectionContext>) -> Self {
        Self::from_string(ctx, String::new())
    }

    /// Wrap a live cursor over the response buffer.
    ///
    /// Only the decoder creates stream-backed values; a value never
    /// transitions back to the stream backing once materialized.
    pub(crate) fn from_stream(ctx: Arc<ConnectionContext>, cursor: StreamCursor) -> Self {
        Self {
            ctx,
            inner: Arc::new(Mutex::new(ClobInner {
                backing: ClobBacking::Stream(cursor),
            })),
        }
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, ClobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn context(&self) -> &Arc<ConnectionContext> {
        &self.ctx
    }

    /// Which backing currently holds the content.
    pub fn backing_kind(&self) -> BackingKind {
        self.lock_inner().backing.kind()
    }

    /// Length of the value in characters.
    ///
    /// Fails with [`Error::Exhausted`] on a stream-backed value whose
    /// connection has already advanced.
    pub fn length(&self) -> Result<u64> {
        self.lock_inner().backing.char_len()
    }

    /// Open a forward-only character reader over the value.
    ///
    /// At most one read stream should be outstanding at a time; opening a
    /// dead stream-backed value fails with [`Error::Exhausted`].
    pub fn open_read_stream(&self) -> Result<LobReadStream> {
        if let ClobBacking::Stream(cur) = &self.lock_inner().backing {
            if !cur.is_valid() {
                return Err(Error::Exhausted);
            }
        }
        Ok(LobReadStream {
            inner: self.inner.clone(),
            pos: 0,
        })
    }

    /// Extract `len` characters starting at the 1-based position `pos`.
    pub fn substring(&self, pos: i64, len: i32) -> Result<String> {
        if pos < 1 {
            return Err(Error::InvalidPosition { pos });
        }
        if len < 0 {
            return Err(Error::InvalidLength { len: len as i64 });
        }
        let total = self.length()?;
        let pos0 = (pos - 1) as u64;
        if pos0 + len as u64 > total {
            return Err(Error::RangeExceeded { length: total });
        }

        let mut stream = self.open_read_stream()?;
        let skipped = stream.skip_chars(pos0)?;
        if skipped != pos0 {
            return Err(Error::SkipMismatch {
                requested: pos0,
                skipped,
            });
        }

        let text = stream.read_chars(len as usize)?;
        let actual = text.chars().count();
        if actual != len as usize {
            return Err(Error::ShortRead {
                expected: len as usize,
                actual,
            });
        }
        Ok(text)
    }

    /// Find the first 0-based offset at or after `start` where `needle`
    /// matches in full, or `-1` if there is none.
    ///
    /// Each candidate offset is compared against the whole needle through
    /// a fresh read stream; there is no partial-match carryover.
    pub fn position(&self, needle: &str, start: i64) -> Result<i64> {
        if start < 0 {
            return Err(Error::InvalidPosition { pos: start });
        }
        let total = self.length()? as i64;
        let needle_len = needle.chars().count() as i64;
        if needle_len > total {
            return Ok(-1);
        }

        for candidate in start..=(total - needle_len) {
            let mut stream = self.open_read_stream()?;
            let skipped = stream.skip_chars(candidate as u64)?;
            if skipped != candidate as u64 {
                return Err(Error::SkipMismatch {
                    requested: candidate as u64,
                    skipped,
                });
            }
            let window = stream.read_chars(needle_len as usize)?;
            if window == needle {
                return Ok(candidate);
            }
        }
        Ok(-1)
    }

    /// Truncate the value to `new_len` characters.
    ///
    /// A result that fits under the connection's LOB buffer is pulled
    /// back into memory and any temporary file is deleted. A larger
    /// result is copied into a fresh backing through the normal spill
    /// path; the old backing is released only once the copy succeeded.
    pub fn truncate(&self, new_len: i64) -> Result<()> {
        if new_len < 0 {
            return Err(Error::InvalidLength { len: new_len });
        }
        let total = self.length()?;
        let new_len = new_len as u64;
        if new_len > total {
            return Err(Error::RangeExceeded { length: total });
        }
        if new_len == total {
            return Ok(());
        }

        debug!(new_len, total, "truncating CLOB value");

        if new_len <= self.ctx.lob_buffer_size() {
            let text = self.read_prefix(new_len)?;
            self.lock_inner().backing = ClobBacking::Memory(text);
            return Ok(());
        }

        // Copy the retained prefix into a fresh backing before releasing
        // the old one.
        let old = {
            let mut guard = self.lock_inner();
            std::mem::replace(&mut guard.backing, ClobBacking::Memory(String::new()))
        };
        match self.copy_prefix_from(&old, new_len) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.lock_inner().backing = old;
                Err(e)
            }
        }
    }

    /// Open a writer positioned at the 1-based character position `pos`.
    ///
    /// Position 1 is always valid; any other position must lie within the
    /// current length.
    pub fn open_write_stream(&self, pos: i64) -> Result<ClobWriter> {
        ClobWriter::open(self, pos)
    }

    /// Read the first `new_len` characters into a string.
    fn read_prefix(&self, new_len: u64) -> Result<String> {
        let mut stream = self.open_read_stream()?;
        let mut text = String::with_capacity(new_len as usize);
        let mut remaining = new_len;
        while remaining > 0 {
            let n = remaining.min(LOB_CHUNK_SIZE as u64) as usize;
            let chunk = stream.read_chars(n)?;
            if chunk.is_empty() {
                return Err(Error::ShortRead {
                    expected: n,
                    actual: 0,
                });
            }
            remaining -= chunk.chars().count() as u64;
            text.push_str(&chunk);
        }
        Ok(text)
    }

    /// Stream the first `new_len` characters of `old` into this value
    /// through a writer, exercising the normal spill rules.
    fn copy_prefix_from(&self, old: &ClobBacking, new_len: u64) -> Result<()> {
        let mut writer = self.open_write_stream(1)?;
        let mut pos = 0u64;
        while pos < new_len {
            let n = (new_len - pos).min(LOB_CHUNK_SIZE as u64) as usize;
            let chunk = old.read_chars_at(pos, n)?;
            if chunk.is_empty() {
                return Err(Error::ShortRead {
                    expected: n,
                    actual: 0,
                });
            }
            writer.write_str(&chunk)?;
            pos += chunk.chars().count() as u64;
        }
        writer.close()
    }
}

/// Forward-only character reader over a [`ClobValue`].
pub struct LobReadStream {
    inner: Arc<Mutex<ClobInner>>,
    pos: u64,
}

impl LobReadStream {
    /// Read up to `n` characters, advancing the stream.
    pub fn read_chars(&mut self, n: usize) -> Result<String> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let text = guard.backing.read_chars_at(self.pos, n)?;
        self.pos += text.chars().count() as u64;
        Ok(text)
    }

    /// Skip up to `n` characters; returns how many were actually skipped.
    pub fn skip_chars(&mut self, n: u64) -> Result<u64> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let total = guard.backing.char_len()?;
        let skipped = n.min(total.saturating_sub(self.pos));
        self.pos += skipped;
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TdsVersion;
    use crate::protocol::buffer::ReadBuffer;
    use bytes::Bytes;
    use std::path::PathBuf;

    fn ctx(lob_buffer_size: u64) -> Arc<ConnectionContext> {
        Arc::new(ConnectionContext::new(TdsVersion::Tds80, lob_buffer_size))
    }

    /// Build a disk-backed value by writing past the threshold.
    fn disk_value(text: &str, threshold: u64) -> ClobValue {
        assert!(text.len() as u64 > threshold);
        let value = ClobValue::empty(ctx(threshold));
        let mut writer = value.open_write_stream(1).unwrap();
        writer.write_str(text).unwrap();
        writer.close().unwrap();
        assert_eq!(value.backing_kind(), BackingKind::Disk);
        value
    }

    /// Build a stream-backed value over a standalone response buffer.
    fn stream_value(text: &str, threshold: u64) -> ClobValue {
        let buf = ReadBuffer::shared(Bytes::from(text.as_bytes().to_vec()));
        let cursor = StreamCursor::new(buf, 0, text.chars().count() as u64, false);
        ClobValue::from_stream(ctx(threshold), cursor)
    }

    fn disk_path(value: &ClobValue) -> PathBuf {
        match &value.lock_inner().backing {
            ClobBacking::Disk(tmp) => tmp.path().to_path_buf(),
            other => panic!("expected disk backing, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_length_per_backing() {
        assert_eq!(
            ClobValue::from_string(ctx(100), "hello").length().unwrap(),
            5
        );
        assert_eq!(disk_value("0123456789", 4).length().unwrap(), 10);
        assert_eq!(stream_value("streamed", 100).length().unwrap(), 8);
    }

    #[test]
    fn test_substring_per_backing() {
        let text = "The quick brown fox jumps over the lazy dog";
        for value in [
            ClobValue::from_string(ctx(1000), text),
            disk_value(text, 8),
            stream_value(text, 1000),
        ] {
            assert_eq!(value.substring(1, 3).unwrap(), "The");
            assert_eq!(value.substring(5, 5).unwrap(), "quick");
            assert_eq!(value.substring(41, 3).unwrap(), "dog");
            assert_eq!(
                value.substring(1, text.len() as i32).unwrap(),
                text,
                "full substring must match the materialized text"
            );
            assert_eq!(value.substring(4, 0).unwrap(), "");
        }
    }

    #[test]
    fn test_substring_argument_errors() {
        let value = ClobValue::from_string(ctx(100), "hello");
        assert!(matches!(
            value.substring(0, 1),
            Err(Error::InvalidPosition { pos: 0 })
        ));
        assert!(matches!(
            value.substring(1, -1),
            Err(Error::InvalidLength { len: -1 })
        ));
        assert!(matches!(
            value.substring(4, 3),
            Err(Error::RangeExceeded { length: 5 })
        ));
    }

    #[test]
    fn test_position_examples() {
        let value = ClobValue::from_string(ctx(100), "abcabc");
        assert_eq!(value.position("bc", 0).unwrap(), 1);
        assert_eq!(value.position("xyz", 0).unwrap(), -1);
        assert_eq!(value.position("bc", 2).unwrap(), 4);
        assert_eq!(value.position("abcabc", 0).unwrap(), 0);
        assert_eq!(value.position("abcabcd", 0).unwrap(), -1);
        assert_eq!(value.position("", 3).unwrap(), 3);
        assert!(matches!(
            value.position("a", -1),
            Err(Error::InvalidPosition { pos: -1 })
        ));
    }

    #[test]
    fn test_position_on_disk_backing() {
        let value = disk_value("needle in a haystack, needle twice", 8);
        assert_eq!(value.position("needle", 0).unwrap(), 0);
        assert_eq!(value.position("needle", 1).unwrap(), 22);
        assert_eq!(value.position("thread", 0).unwrap(), -1);
    }

    #[test]
    fn test_truncate_below_threshold() {
        let value = ClobValue::from_string(ctx(100), "hello world");
        value.truncate(5).unwrap();
        assert_eq!(value.length().unwrap(), 5);
        assert_eq!(value.substring(1, 5).unwrap(), "hello");
        assert_eq!(value.backing_kind(), BackingKind::Memory);
    }

    #[test]
    fn test_truncate_above_threshold_stays_on_disk() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let value = disk_value(text, 8);
        let old_path = disk_path(&value);

        value.truncate(20).unwrap();

        assert_eq!(value.backing_kind(), BackingKind::Disk);
        assert_eq!(value.length().unwrap(), 20);
        assert_eq!(value.substring(1, 20).unwrap(), &text[..20]);
        // The superseded temp file is gone and a fresh one took its place.
        assert!(!old_path.exists());
        assert_ne!(disk_path(&value), old_path);
    }

    #[test]
    fn test_spill_then_truncate_deletes_temp_file() {
        let value = disk_value("0123456789abcdef", 8);
        let path = disk_path(&value);
        assert!(path.exists());

        value.truncate(4).unwrap();

        assert_eq!(value.backing_kind(), BackingKind::Memory);
        assert_eq!(value.substring(1, 4).unwrap(), "0123");
        assert!(!path.exists(), "temp file must be deleted on re-materialization");
    }

    #[test]
    fn test_truncate_argument_errors() {
        let value = ClobValue::from_string(ctx(100), "hello");
        assert!(matches!(
            value.truncate(-1),
            Err(Error::InvalidLength { len: -1 })
        ));
        assert!(matches!(
            value.truncate(6),
            Err(Error::RangeExceeded { length: 5 })
        ));
        // Truncating to the current length is a no-op.
        value.truncate(5).unwrap();
        assert_eq!(value.substring(1, 5).unwrap(), "hello");
    }

    #[test]
    fn test_truncate_stream_backed_value() {
        let value = stream_value("stream me down", 100);
        value.truncate(6).unwrap();
        assert_eq!(value.backing_kind(), BackingKind::Memory);
        assert_eq!(value.substring(1, 6).unwrap(), "stream");
    }

    #[test]
    fn test_stream_value_exhausted_after_advance() {
        let buf = ReadBuffer::shared(Bytes::from_static(b"one shot"));
        let cursor = StreamCursor::new(buf.clone(), 0, 8, false);
        let value = ClobValue::from_stream(ctx(100), cursor);

        assert_eq!(value.substring(1, 8).unwrap(), "one shot");

        // The connection advances to the next unit of protocol data.
        buf.lock().unwrap().invalidate_cursors();

        assert!(matches!(value.length(), Err(Error::Exhausted)));
        assert!(matches!(value.substring(1, 1), Err(Error::Exhausted)));
        assert!(matches!(value.open_read_stream(), Err(Error::Exhausted)));
    }

    #[test]
    fn test_stream_value_survives_advance_once_materialized() {
        let buf = ReadBuffer::shared(Bytes::from_static(b"keep me around"));
        let cursor = StreamCursor::new(buf.clone(), 0, 14, false);
        let value = ClobValue::from_stream(ctx(100), cursor);

        // Opening a writer drains the stream into memory.
        let mut writer = value.open_write_stream(1).unwrap();
        writer.close().unwrap();
        assert_eq!(value.backing_kind(), BackingKind::Memory);

        buf.lock().unwrap().invalidate_cursors();

        assert_eq!(value.substring(1, 14).unwrap(), "keep me around");
    }

    #[test]
    fn test_read_stream_chunks() {
        let value = ClobValue::from_string(ctx(100), "abcdefgh");
        let mut stream = value.open_read_stream().unwrap();
        assert_eq!(stream.read_chars(3).unwrap(), "abc");
        assert_eq!(stream.skip_chars(2).unwrap(), 2);
        assert_eq!(stream.read_chars(10).unwrap(), "fgh");
        assert_eq!(stream.read_chars(1).unwrap(), "");
        // Skipping past the end reports the shortfall.
        let mut stream = value.open_read_stream().unwrap();
        assert_eq!(stream.skip_chars(20).unwrap(), 8);
    }
}
