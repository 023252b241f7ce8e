//! Buffer utilities for reading TDS protocol data.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::{Error, Result};

/// Shared handle to a response buffer.
///
/// Stream-backed LOB values hold one of these so they can read lazily
/// from the connection's buffered response data.
pub type SharedReadBuffer = Arc<Mutex<ReadBuffer>>;

/// A buffer for reading TDS protocol data.
#[derive(Debug)]
pub struct ReadBuffer {
    data: Bytes,
    pos: usize,
    generation: u64,
}

impl ReadBuffer {
    /// Create a new read buffer from bytes.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            pos: 0,
            generation: 0,
        }
    }

    /// Create a new read buffer wrapped in a shared handle.
    pub fn shared(data: Bytes) -> SharedReadBuffer {
        Arc::new(Mutex::new(Self::new(data)))
    }

    /// Get the current position in the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the read position to an absolute offset.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::BufferTooSmall {
                needed: pos,
                available: self.data.len(),
                location: std::panic::Location::caller(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Get the remaining bytes in the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if the buffer has at least `n` bytes remaining.
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// Current cursor generation.
    ///
    /// A stream cursor captures the generation when it is created and
    /// refuses to read once the generation has moved on.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidate every outstanding stream cursor over this buffer.
    ///
    /// Called when the connection advances to the next unit of protocol
    /// data; any LOB value still reading lazily from the buffer must have
    /// been materialized before this point.
    pub fn invalidate_cursors(&mut self) {
        self.generation += 1;
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if !self.has_remaining(n) {
            return Err(Error::BufferTooSmall {
                needed: n,
                available: self.remaining(),
                location: std::panic::Location::caller(),
            });
        }
        self.pos += n;
        Ok(())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        if !self.has_remaining(1) {
            return Err(Error::BufferTooSmall {
                needed: 1,
                available: self.remaining(),
                location: std::panic::Location::caller(),
            });
        }
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    /// Read a little-endian u16.
    pub fn read_u16_le(&mut self) -> Result<u16> {
        if !self.has_remaining(2) {
            return Err(Error::BufferTooSmall {
                needed: 2,
                available: self.remaining(),
                location: std::panic::Location::caller(),
            });
        }
        let val = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    /// Read a little-endian i32.
    pub fn read_i32_le(&mut self) -> Result<i32> {
        if !self.has_remaining(4) {
            return Err(Error::BufferTooSmall {
                needed: 4,
                available: self.remaining(),
                location: std::panic::Location::caller(),
            });
        }
        let val = i32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(val)
    }

    /// Read raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        if !self.has_remaining(n) {
            return Err(Error::BufferTooSmall {
                needed: n,
                available: self.remaining(),
                location: std::panic::Location::caller(),
            });
        }
        let bytes = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(bytes)
    }

    /// Read `n` bytes of single-byte character data.
    ///
    /// Uses lossy UTF-8 conversion to handle stray binary data gracefully.
    pub fn read_ascii_string(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read `chars` UCS-2 little-endian characters (two bytes each).
    pub fn read_ucs2_string(&mut self, chars: usize) -> Result<String> {
        let bytes = self.read_bytes(chars * 2)?;
        let units: Vec<u16> = bytes
            .chunks(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }
}
