//! I/O layer - Generic abstractions for process management and transport
//!
//! - **Transport**: Pure I/O layer for bidirectional message exchange over
//!   child stdio or a TCP socket
//! - **Process**: External process lifecycle management with stdio integration
//!
//! Nothing here knows about LSP; framing lives in `crate::lsp`.

pub mod process;
pub mod transport;

pub use process::{ChildProcessManager, ProcessError, ProcessManager, StderrMonitor, StopMode};
pub use transport::StreamTransport;
