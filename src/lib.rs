//! TDS thin client LOB subsystem for Rust.
//!
//! Client-side handling of character large objects (CLOBs) exchanged
//! with a TDS database server: wire decoding of TEXT/NTEXT column
//! values, a mutable [`ClobValue`] with in-memory, disk-spilled, and
//! wire-streamed backings, and a spillover writer that moves growing
//! values to a temporary file once they exceed the connection's LOB
//! buffer size.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tds_thin_rs::{ClobValue, ConnectionContext, Result, TdsVersion};
//!
//! fn main() -> Result<()> {
//!     let ctx = Arc::new(ConnectionContext::with_defaults(TdsVersion::Tds80));
//!
//!     let clob = ClobValue::from_string(ctx, "hello world");
//!     assert_eq!(clob.length()?, 11);
//!     assert_eq!(clob.substring(7, 5)?, "world");
//!     assert_eq!(clob.position("world", 0)?, 6);
//!
//!     clob.truncate(5)?;
//!     assert_eq!(clob.substring(1, 5)?, "hello");
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod protocol;

// Re-export main types
pub use connection::{ConnectionContext, TdsVersion};
pub use error::{Error, Result};
pub use protocol::buffer::{ReadBuffer, SharedReadBuffer};
pub use protocol::decode::{read_clob, read_clob_deferred};
pub use protocol::types::{BackingKind, ClobValue, ClobWriter, LobReadStream, TextPtr};
