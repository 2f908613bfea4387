//! Transports carrying tool calls into the engine.

pub mod stdio;

pub use stdio::StdioTransport;
