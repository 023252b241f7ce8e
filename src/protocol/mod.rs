//! TDS wire protocol support.

pub mod buffer;
pub mod constants;
pub mod decode;
pub mod types;
