//! Streaming insert over WebSocket
//!
//! Long-lived insert connections. The client sends batch messages, the
//! server answers each with its summary, in order:
//!
//! ```text
//! → {"type":"batch","seq":1,"indexId":"001","records":[{"txId":"0x..","data":{..}}]}
//! ← {"type":"summary","seq":1,"summary":{"inserted":1,"skipped":0,"failed":0,..}}
//! ```
//!
//! Each batch commits on its own; there is no transaction across batches.

pub mod handler;
pub mod messages;

pub use handler::{serve_connection, stream_insert_handler};
pub use messages::{ClientMessage, ServerMessage};
