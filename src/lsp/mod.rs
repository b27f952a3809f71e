//! Language Server Protocol client
//!
//! Layered on top of the generic I/O layer (`crate::io`):
//!
//! - **Framing**: LSP message framing (Content-Length headers)
//! - **Protocol**: JSON-RPC 2.0 requests, notifications and server requests
//! - **Client**: typed handshake, document sync and shutdown using lsp-types

pub mod client;
pub mod framing;
pub mod jsonrpc_utils;
pub mod protocol;
#[cfg(test)]
pub mod testing;

pub use client::{ClientIdentity, LspClient, LspError};
pub use protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
