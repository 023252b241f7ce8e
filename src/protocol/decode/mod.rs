//! Data type decoders for the TDS wire protocol.

mod text;

pub use text::{read_clob, read_clob_deferred};
