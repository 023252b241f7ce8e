//! Connection-scoped session state consumed by the LOB subsystem.

use std::io;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::protocol::constants::DEFAULT_LOB_BUFFER_SIZE;

/// TDS protocol dialect negotiated at login.
///
/// Ordering follows the protocol history, so version comparisons work
/// directly (`Tds50 < Tds70`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TdsVersion {
    /// TDS 4.2 (SQL Server 6.x and Sybase).
    Tds42,
    /// TDS 5.0 (Sybase ASE).
    Tds50,
    /// TDS 7.0 (SQL Server 7).
    Tds70,
    /// TDS 8.0 (SQL Server 2000).
    Tds80,
}

impl TdsVersion {
    /// Whether this dialect predates TDS 7.0.
    ///
    /// Legacy dialects store a zero-length string as a single space to
    /// distinguish it from NULL.
    pub fn is_legacy(self) -> bool {
        self < TdsVersion::Tds70
    }
}

/// Connection-scoped settings shared by every LOB value created on the
/// connection.
#[derive(Debug)]
pub struct ConnectionContext {
    /// Negotiated protocol dialect.
    tds_version: TdsVersion,
    /// Maximum number of bytes a LOB value may hold in memory before it
    /// is spilled to a temporary file.
    lob_buffer_size: u64,
}

impl ConnectionContext {
    /// Create a context with an explicit LOB buffer size.
    pub fn new(tds_version: TdsVersion, lob_buffer_size: u64) -> Self {
        Self {
            tds_version,
            lob_buffer_size,
        }
    }

    /// Create a context with the default LOB buffer size.
    pub fn with_defaults(tds_version: TdsVersion) -> Self {
        Self::new(tds_version, DEFAULT_LOB_BUFFER_SIZE)
    }

    /// The negotiated protocol dialect.
    pub fn tds_version(&self) -> TdsVersion {
        self.tds_version
    }

    /// The memory/disk spill boundary for LOB values, in bytes.
    pub fn lob_buffer_size(&self) -> u64 {
        self.lob_buffer_size
    }

    /// Create a temporary file for spilled LOB data.
    ///
    /// The file is exclusively owned by the returned handle and deleted
    /// when the handle drops. A creation denied by the environment is
    /// reported as [`Error::PermissionDenied`] so callers can fall back
    /// to in-memory buffering.
    pub fn create_lob_file(&self) -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix("tds")
            .suffix(".tmp")
            .tempfile()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    Error::PermissionDenied {
                        message: e.to_string(),
                    }
                } else {
                    Error::Io(e)
                }
            })
    }
}
