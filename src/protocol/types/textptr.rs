//! Text pointer handle sent ahead of TEXT/NTEXT column data.

use crate::error::{Error, Result};
use crate::protocol::buffer::ReadBuffer;
use crate::protocol::constants::{TEXT_PTR_SIZE, TEXT_TIMESTAMP_SIZE};

/// Server-side handle for a TEXT/NTEXT value.
///
/// The pointer and timestamp bytes are opaque to the client; they are
/// echoed back to the server when the value is written. The length field
/// gives the size of the payload that follows, in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPtr {
    /// Opaque pointer bytes.
    pub ptr: [u8; TEXT_PTR_SIZE],
    /// Opaque timestamp bytes.
    pub ts: [u8; TEXT_TIMESTAMP_SIZE],
    /// Payload length in bytes.
    pub len: u32,
}

impl TextPtr {
    /// Read a text pointer and its length field from the wire.
    pub fn read(buf: &mut ReadBuffer) -> Result<Self> {
        let mut ptr = [0u8; TEXT_PTR_SIZE];
        ptr.copy_from_slice(&buf.read_bytes(TEXT_PTR_SIZE)?);

        let mut ts = [0u8; TEXT_TIMESTAMP_SIZE];
        ts.copy_from_slice(&buf.read_bytes(TEXT_TIMESTAMP_SIZE)?);

        let len = buf.read_i32_le()?;
        if len < 0 {
            return Err(Error::protocol(format!("negative TEXT length: {}", len)));
        }

        Ok(Self {
            ptr,
            ts,
            len: len as u32,
        })
    }

    /// Payload length in characters for the given column encoding.
    ///
    /// Wide (NTEXT) data uses two bytes per character; an odd trailing
    /// byte holds only half a character and is excluded.
    pub fn char_len(&self, wide: bool) -> u64 {
        if wide {
            (self.len / 2) as u64
        } else {
            self.len as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn wire_header(len: i32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xAB; TEXT_PTR_SIZE]);
        data.extend_from_slice(&[0xCD; TEXT_TIMESTAMP_SIZE]);
        data.extend_from_slice(&len.to_le_bytes());
        data
    }

    #[test]
    fn test_read_text_ptr() {
        let mut buf = ReadBuffer::new(Bytes::from(wire_header(512)));
        let tp = TextPtr::read(&mut buf).unwrap();
        assert_eq!(tp.ptr, [0xAB; TEXT_PTR_SIZE]);
        assert_eq!(tp.ts, [0xCD; TEXT_TIMESTAMP_SIZE]);
        assert_eq!(tp.len, 512);
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut buf = ReadBuffer::new(Bytes::from(wire_header(-1)));
        assert!(matches!(
            TextPtr::read(&mut buf),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_char_len_halved_for_wide() {
        let tp = TextPtr {
            ptr: [0; TEXT_PTR_SIZE],
            ts: [0; TEXT_TIMESTAMP_SIZE],
            len: 7,
        };
        assert_eq!(tp.char_len(false), 7);
        // Odd wide length floors; the half character is discarded.
        assert_eq!(tp.char_len(true), 3);
    }
}
