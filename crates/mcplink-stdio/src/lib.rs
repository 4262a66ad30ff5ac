//! # mcplink-stdio
//!
//! STDIO transport for MCP servers spawned as child processes.
//!
//! Child processes write two very different things to the same stdout pipe:
//! JSON-RPC traffic and build/progress noise. On top of that, pipe writes
//! past the ~64 KB buffer boundary are not atomic, so large messages cannot
//! be trusted to arrive in one `write`. This crate deals with both:
//!
//! - [`framing`] chunks oversize messages into `{id}:{index}:{total}:{payload}`
//!   frames of at most 60 KiB payload and reassembles them on the far side.
//! - [`filter`] admits only structurally valid JSON-RPC 2.0 records,
//!   dropping interleaved log lines.
//! - [`transport`] owns the child's pipes and wires both together behind
//!   the [`Transport`](mcplink_transport_traits::Transport) trait.

pub mod filter;
pub mod framing;
pub mod transport;

pub use filter::LogFilter;
pub use framing::{Frame, MAX_CHUNK_SIZE, Reassembler, chunk_message, parse_frame};
pub use transport::{StdioServerConfig, StdioTransport};
