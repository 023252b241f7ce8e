//! TDS protocol constants for the LOB subsystem.

/// Size of the opaque text pointer handle sent ahead of a TEXT/NTEXT value.
pub const TEXT_PTR_SIZE: usize = 16;

/// Size of the text timestamp that follows the pointer.
pub const TEXT_TIMESTAMP_SIZE: usize = 8;

/// Chunk size used when streaming LOB data between backings, in bytes.
pub const LOB_CHUNK_SIZE: usize = 1024;

/// Default in-memory LOB buffer size in bytes.
///
/// Values larger than the connection's buffer size are spilled to a
/// temporary file instead of being held in memory.
pub const DEFAULT_LOB_BUFFER_SIZE: u64 = 32768;
