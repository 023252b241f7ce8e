//! TEXT/NTEXT column value decoding.

use std::sync::{Arc, PoisonError};

use tracing::trace;

use crate::connection::ConnectionContext;
use crate::error::Result;
use crate::protocol::buffer::{ReadBuffer, SharedReadBuffer};
use crate::protocol::constants::LOB_CHUNK_SIZE;
use crate::protocol::types::{ClobValue, StreamCursor, TextPtr};

/// Decode a TEXT/NTEXT column value into a [`ClobValue`].
///
/// Values smaller than the connection's LOB buffer are read straight into
/// memory. Larger values are streamed through a writer in fixed chunks,
/// which spills them to disk without ever holding the whole payload in
/// memory at once.
pub fn read_clob(
    ctx: &Arc<ConnectionContext>,
    buf: &mut ReadBuffer,
    wide: bool,
) -> Result<ClobValue> {
    let tp = TextPtr::read(buf)?;
    trace!(len = tp.len, wide, "decoding TEXT column value");

    let value = if (tp.len as u64) < ctx.lob_buffer_size() {
        let text = if wide {
            buf.read_ucs2_string((tp.len / 2) as usize)?
        } else {
            buf.read_ascii_string(tp.len as usize)?
        };
        ClobValue::from_string(ctx.clone(), text)
    } else {
        let value = ClobValue::empty(ctx.clone());
        let mut writer = value.open_write_stream(1)?;
        let mut remaining = tp.len as u64;
        while remaining > 0 {
            let n = remaining.min(LOB_CHUNK_SIZE as u64) as usize;
            let chunk = if wide {
                buf.read_ucs2_string(n / 2)?
            } else {
                buf.read_ascii_string(n)?
            };
            writer.write_str(&chunk)?;
            remaining -= n as u64;
        }
        writer.close()?;
        value
    };

    // Legacy dialects store a zero-length string as a single space to
    // distinguish it from NULL.
    if ctx.tds_version().is_legacy()
        && value.length()? == 1
        && value.substring(1, 1)? == " "
    {
        value.truncate(0)?;
    }

    // An odd NTEXT byte length leaves half a character on the wire.
    if wide && tp.len % 2 == 1 {
        buf.read_u8()?;
    }

    Ok(value)
}

/// Decode a TEXT/NTEXT column value into a stream-backed [`ClobValue`]
/// without pulling the payload off the response buffer.
///
/// The buffer position is advanced past the payload; the returned value
/// reads through a cursor that stays valid until the connection calls
/// [`ReadBuffer::invalidate_cursors`]. The caller must materialize the
/// value (open a writer, or truncate) before that point, or later
/// accesses fail with [`crate::Error::Exhausted`].
pub fn read_clob_deferred(
    ctx: &Arc<ConnectionContext>,
    buf: &SharedReadBuffer,
    wide: bool,
) -> Result<ClobValue> {
    let mut guard = buf.lock().unwrap_or_else(PoisonError::into_inner);
    let tp = TextPtr::read(&mut guard)?;
    trace!(len = tp.len, wide, "deferring TEXT column value");

    let start = guard.position();
    guard.skip(tp.len as usize)?;
    drop(guard);

    let cursor = StreamCursor::new(buf.clone(), start, tp.char_len(wide), wide);
    Ok(ClobValue::from_stream(ctx.clone(), cursor))
}
