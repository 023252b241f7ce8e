//! Value types exchanged over the TDS wire protocol.

pub mod clob;
pub mod stream;
pub mod textptr;
pub mod writer;

pub use clob::{BackingKind, ClobValue, LobReadStream};
pub use stream::StreamCursor;
pub use textptr::TextPtr;
pub use writer::ClobWriter;
