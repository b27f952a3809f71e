//! Error types for the Beef language session

use crate::io::ProcessError;
use crate::lsp::LspError;
use crate::session::selector::FileUriError;

/// Errors raised by session lifecycle and document routing
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session stopped")]
    Stopped,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionConfigError {
    #[error("Exactly one transport must be configured, got both spawn and dial")]
    ConflictingTransport,

    #[error("No transport configured: set a server command or a TCP address")]
    MissingTransport,

    #[error("Invalid server command: '{0}'")]
    InvalidCommand(String),

    #[error("Invalid TCP address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Request timeout must be greater than zero")]
    InvalidTimeout,

    #[error("Document selector must contain at least one filter")]
    EmptySelector,

    #[error("Invalid workspace root: {0}")]
    InvalidRoot(#[from] FileUriError),
}
