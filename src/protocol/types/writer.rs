//! Spillover writer for mutating CLOB values in place.
//!
//! The writer splices characters into the in-memory string until the
//! value outgrows the connection's LOB buffer, then moves the content to
//! a temporary file and continues with positioned writes there. If the
//! temporary file cannot be created for permission reasons the writer
//! keeps buffering in memory for the rest of its life.

use std::io::{Seek, SeekFrom, Write};

use tracing::{debug, warn};

use crate::connection::ConnectionContext;
use crate::error::{Error, Result};
use crate::protocol::constants::LOB_CHUNK_SIZE;
use crate::protocol::types::clob::{ClobBacking, ClobInner, ClobValue};

/// Destination strategy for writer output.
///
/// Selected once when the writer opens and re-selected after a spill,
/// instead of re-deciding on every write.
trait LobSink: Send {
    /// Write `data` at character offset `pos` of the backing.
    fn write_at(&mut self, inner: &mut ClobInner, pos: u64, data: &str) -> Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self, inner: &mut ClobInner) -> Result<()>;
}

/// Splices characters into the in-memory string: content before the
/// cursor is preserved, the written region is overwritten, and any tail
/// beyond it is re-appended.
struct MemorySink;

impl LobSink for MemorySink {
    fn write_at(&mut self, inner: &mut ClobInner, pos: u64, data: &str) -> Result<()> {
        match &mut inner.backing {
            ClobBacking::Memory(text) => {
                *text = splice(text, pos as usize, data);
                Ok(())
            }
            _ => Err(Error::protocol("memory sink over non-memory backing")),
        }
    }

    fn flush(&mut self, _inner: &mut ClobInner) -> Result<()> {
        Ok(())
    }
}

/// Positioned random-access writes into the temporary file, one byte per
/// character.
struct DiskSink;

impl LobSink for DiskSink {
    fn write_at(&mut self, inner: &mut ClobInner, pos: u64, data: &str) -> Result<()> {
        match &mut inner.backing {
            ClobBacking::Disk(tmp) => {
                let file = tmp.as_file_mut();
                file.seek(SeekFrom::Start(pos))?;
                file.write_all(data.as_bytes())?;
                Ok(())
            }
            _ => Err(Error::protocol("disk sink over non-disk backing")),
        }
    }

    fn flush(&mut self, inner: &mut ClobInner) -> Result<()> {
        match &mut inner.backing {
            ClobBacking::Disk(tmp) => {
                tmp.as_file_mut().flush()?;
                Ok(())
            }
            _ => Err(Error::protocol("disk sink over non-disk backing")),
        }
    }
}

fn splice(text: &str, pos: usize, data: &str) -> String {
    let head: String = text.chars().take(pos).collect();
    let n = data.chars().count();
    let tail: String = text.chars().skip(pos + n).collect();

    let mut out = String::with_capacity(head.len() + data.len() + tail.len());
    out.push_str(&head);
    out.push_str(data);
    out.push_str(&tail);
    out
}

/// Copy the current content into a fresh temporary file and swap the
/// backing over. On failure the partially written file is deleted and the
/// old backing is left untouched.
fn materialize_to_disk(ctx: &ConnectionContext, inner: &mut ClobInner) -> Result<()> {
    let mut tmp = ctx.create_lob_file()?;
    let mut pos = 0u64;
    loop {
        let chunk = inner.backing.read_chars_at(pos, LOB_CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        tmp.as_file_mut().write_all(chunk.as_bytes())?;
        pos += chunk.chars().count() as u64;
    }
    tmp.as_file_mut().flush()?;

    debug!(chars = pos, path = ?tmp.path(), "spilled CLOB value to disk");
    inner.backing = ClobBacking::Disk(tmp);
    Ok(())
}

/// Drain a stream-backed value into memory. A no-op for other backings.
fn materialize_to_memory(inner: &mut ClobInner) -> Result<()> {
    if !matches!(inner.backing, ClobBacking::Stream(_)) {
        return Ok(());
    }
    let mut text = String::new();
    let mut pos = 0u64;
    loop {
        let chunk = inner.backing.read_chars_at(pos, LOB_CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        pos += chunk.chars().count() as u64;
        text.push_str(&chunk);
    }
    inner.backing = ClobBacking::Memory(text);
    Ok(())
}

/// Writer over a [`ClobValue`], handed out by
/// [`ClobValue::open_write_stream`].
pub struct ClobWriter {
    value: ClobValue,
    /// Cursor in characters, 0-based.
    pos: u64,
    /// Spill boundary from the owning connection.
    threshold: u64,
    sink: Box<dyn LobSink>,
    /// A temp-file creation was denied; all further writes stay in
    /// memory regardless of the threshold.
    security_failure: bool,
    closed: bool,
}

impl ClobWriter {
    pub(crate) fn open(value: &ClobValue, pos: i64) -> Result<Self> {
        if pos < 1 {
            return Err(Error::InvalidPosition { pos });
        }
        let length = value.length()?;
        if pos as u64 > length && pos != 1 {
            return Err(Error::RangeExceeded { length });
        }

        let ctx = value.context().clone();
        let threshold = ctx.lob_buffer_size();
        let mut security_failure = false;

        let mut guard = value.lock_inner();

        // Bring the backing into a writable shape first: a value already
        // past the threshold belongs on disk, while a stream-backed value
        // must be drained before it can accept writes.
        if length > threshold && !matches!(guard.backing, ClobBacking::Disk(_)) {
            match materialize_to_disk(&ctx, &mut guard) {
                Ok(()) => {}
                Err(Error::PermissionDenied { message }) => {
                    warn!("unable to buffer CLOB data to disk: {message}");
                    materialize_to_memory(&mut guard)?;
                    security_failure = true;
                }
                Err(e) => return Err(e),
            }
        } else if matches!(guard.backing, ClobBacking::Stream(_)) {
            materialize_to_memory(&mut guard)?;
        }

        let sink: Box<dyn LobSink> = match guard.backing {
            ClobBacking::Disk(_) => Box::new(DiskSink),
            _ => Box::new(MemorySink),
        };
        drop(guard);

        Ok(Self {
            value: value.clone(),
            pos: (pos - 1) as u64,
            threshold,
            sink,
            security_failure,
            closed: false,
        })
    }

    /// Current cursor position in characters, 0-based.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Write `data` at the current cursor and advance it.
    pub fn write_str(&mut self, data: &str) -> Result<()> {
        if self.closed {
            return Err(Error::WriterClosed);
        }
        if data.is_empty() {
            return Ok(());
        }
        let n = data.chars().count() as u64;

        let value = self.value.clone();
        let mut guard = value.lock_inner();
        self.check_size(&mut guard, n)?;
        self.sink.write_at(&mut guard, self.pos, data)?;
        self.pos += n;
        Ok(())
    }

    /// Flush buffered output without closing the writer.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::WriterClosed);
        }
        let mut guard = self.value.lock_inner();
        self.sink.flush(&mut guard)
    }

    /// Finalize the writer. Idempotent; writes after `close` fail with
    /// [`Error::WriterClosed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut guard = self.value.lock_inner();
        self.sink.flush(&mut guard)?;
        drop(guard);
        self.closed = true;
        Ok(())
    }

    /// Decide whether writing `n` more characters pushes the value past
    /// the in-memory limit, and spill if so.
    fn check_size(&mut self, inner: &mut ClobInner, n: u64) -> Result<()> {
        // Already past the limit: the spill decision was made earlier.
        if self.pos > self.threshold {
            return Ok(());
        }
        // Already writing to disk.
        if matches!(inner.backing, ClobBacking::Disk(_)) {
            return Ok(());
        }
        // A previous spill attempt was denied; keep buffering in memory.
        if self.security_failure {
            return Ok(());
        }
        // Still fits.
        if self.pos + n <= self.threshold {
            return Ok(());
        }

        match materialize_to_disk(self.value.context(), inner) {
            Ok(()) => {
                self.sink = Box::new(DiskSink);
                Ok(())
            }
            Err(Error::PermissionDenied { message }) => {
                warn!("unable to buffer CLOB data to disk: {message}");
                self.security_failure = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for ClobWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
