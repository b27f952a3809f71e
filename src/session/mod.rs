//! Beef language session
//!
//! Connects to the Beef language server over one configured transport,
//! reflects the connection in a status item and routes `bf` documents.

pub mod config;
pub mod error;
pub mod manager;
pub mod selector;
pub mod status;

pub use config::{SessionConfig, SessionConfigBuilder, TransportConfig};
pub use error::{SessionConfigError, SessionError};
pub use manager::Session;
pub use selector::TextDocument;
