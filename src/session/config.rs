//! Configuration for Beef language sessions
//!
//! Provides [`SessionConfig`] with a validating builder and environment
//! lookup for the transport. Exactly one transport mode is active per
//! configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::lsp::ClientIdentity;
use crate::session::error::SessionConfigError;
use crate::session::selector::DocumentSelector;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Executable spawned in spawn mode unless overridden
pub const DEFAULT_SERVER_COMMAND: &str = "BeefLsp";

/// Loopback host dialed in TCP mode
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";

/// Port the Beef language server listens on in TCP mode
pub const DEFAULT_TCP_PORT: u16 = 5556;

/// Default timeout for `initialize` and `shutdown` requests (10 seconds)
///
/// Connecting and waiting for readiness are never timed out.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Client id registered with the host
pub const CLIENT_ID: &str = "beeflang";

/// Server notification announcing full readiness
pub const READY_NOTIFICATION: &str = "beef/initialized";

/// Human readable client name
pub const CLIENT_NAME: &str = "Beef Lang";

/// Environment variable selecting spawn mode with the given executable
pub const ENV_SERVER_PATH: &str = "BEEF_LSP_PATH";

/// Environment variable selecting TCP mode with `host:port`
pub const ENV_TCP_ADDRESS: &str = "BEEF_LSP_TCP";

// ============================================================================
// Transport Configuration
// ============================================================================

/// How the session reaches the language server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Spawn an executable and talk over its stdin/stdout
    Spawn {
        command: String,
        args: Vec<String>,
        working_directory: Option<PathBuf>,
    },
    /// Dial a TCP endpoint and use the socket in both directions
    Dial { host: String, port: u16 },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Dial {
            host: DEFAULT_TCP_HOST.to_string(),
            port: DEFAULT_TCP_PORT,
        }
    }
}

impl TransportConfig {
    pub fn spawn(command: impl Into<String>) -> Self {
        TransportConfig::Spawn {
            command: command.into(),
            args: Vec::new(),
            working_directory: None,
        }
    }

    pub fn dial(host: impl Into<String>, port: u16) -> Self {
        TransportConfig::Dial {
            host: host.into(),
            port,
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            TransportConfig::Spawn { command, args, .. } if args.is_empty() => {
                format!("spawn {command}")
            }
            TransportConfig::Spawn { command, args, .. } => {
                format!("spawn {command} {}", args.join(" "))
            }
            TransportConfig::Dial { host, port } => format!("tcp {host}:{port}"),
        }
    }

    /// Read the transport from `BEEF_LSP_PATH` / `BEEF_LSP_TCP`
    ///
    /// Returns `Ok(None)` when neither is set, and an error when both are.
    pub fn from_env() -> Result<Option<Self>, SessionConfigError> {
        Self::from_values(
            env::var(ENV_SERVER_PATH).ok(),
            env::var(ENV_TCP_ADDRESS).ok(),
        )
    }

    fn from_values(
        server_path: Option<String>,
        tcp_address: Option<String>,
    ) -> Result<Option<Self>, SessionConfigError> {
        let server_path = server_path.filter(|value| !value.trim().is_empty());
        let tcp_address = tcp_address.filter(|value| !value.trim().is_empty());

        match (server_path, tcp_address) {
            (Some(_), Some(_)) => Err(SessionConfigError::ConflictingTransport),
            (Some(command), None) => Ok(Some(Self::spawn(command))),
            (None, Some(address)) => {
                let (host, port) = parse_tcp_address(&address)?;
                Ok(Some(Self::dial(host, port)))
            }
            (None, None) => Ok(None),
        }
    }

    fn validate(&self) -> Result<(), SessionConfigError> {
        match self {
            TransportConfig::Spawn { command, .. } if command.trim().is_empty() => {
                Err(SessionConfigError::InvalidCommand(command.clone()))
            }
            TransportConfig::Dial { host, port } if host.trim().is_empty() || *port == 0 => {
                Err(SessionConfigError::InvalidAddress {
                    address: format!("{host}:{port}"),
                    reason: "host must be non-empty and port non-zero".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Parse `host:port`, `:port` or a bare `port` (host defaults to loopback)
pub fn parse_tcp_address(address: &str) -> Result<(String, u16), SessionConfigError> {
    let invalid = |reason: &str| SessionConfigError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let address = address.trim();
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host.trim_matches(['[', ']']), port),
        None => ("", address),
    };

    let port = port
        .parse::<u16>()
        .map_err(|_| invalid("port must be a number between 1 and 65535"))?;
    if port == 0 {
        return Err(invalid("port must be non-zero"));
    }

    let host = if host.is_empty() {
        DEFAULT_TCP_HOST
    } else {
        host
    };
    Ok((host.to_string(), port))
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Complete session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,

    /// Which documents are routed to the session
    pub document_selector: DocumentSelector,

    /// Identity reported in `initialize`
    pub identity: ClientIdentity,

    /// Timeout for `initialize` and `shutdown`
    pub request_timeout: Duration,

    /// Workspace root sent as `rootUri`
    pub root_uri: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            document_selector: DocumentSelector::default(),
            identity: ClientIdentity::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            root_uri: None,
        }
    }
}

/// Builder for SessionConfig with validation
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    spawn_command: Option<String>,
    spawn_args: Vec<String>,
    working_directory: Option<PathBuf>,
    dial_address: Option<(String, u16)>,
    document_selector: Option<DocumentSelector>,
    request_timeout: Option<Duration>,
    root_uri: Option<String>,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use spawn mode with the given executable
    pub fn spawn(mut self, command: impl Into<String>) -> Self {
        self.spawn_command = Some(command.into());
        self
    }

    /// Add a command-line argument for the spawned server
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spawn_args.push(arg.into());
        self
    }

    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Use TCP mode against `host:port`
    pub fn dial(mut self, host: impl Into<String>, port: u16) -> Self {
        self.dial_address = Some((host.into(), port));
        self
    }

    /// Set the transport from an existing [`TransportConfig`]
    pub fn transport(self, transport: TransportConfig) -> Self {
        match transport {
            TransportConfig::Spawn {
                command,
                args,
                working_directory,
            } => {
                let mut builder = self.spawn(command);
                builder.spawn_args.extend(args);
                builder.working_directory = working_directory.or(builder.working_directory);
                builder
            }
            TransportConfig::Dial { host, port } => self.dial(host, port),
        }
    }

    #[cfg(test)]
    pub fn document_selector(mut self, selector: DocumentSelector) -> Self {
        self.document_selector = Some(selector);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn root_uri(mut self, uri: impl Into<String>) -> Self {
        self.root_uri = Some(uri.into());
        self
    }

    pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
        let transport = match (self.spawn_command, self.dial_address) {
            (Some(_), Some(_)) => return Err(SessionConfigError::ConflictingTransport),
            (None, None) => return Err(SessionConfigError::MissingTransport),
            (Some(command), None) => TransportConfig::Spawn {
                command,
                args: self.spawn_args,
                working_directory: self.working_directory,
            },
            (None, Some((host, port))) => TransportConfig::Dial { host, port },
        };
        transport.validate()?;

        let document_selector = self.document_selector.unwrap_or_default();
        if document_selector.is_empty() {
            return Err(SessionConfigError::EmptySelector);
        }

        let request_timeout = self
            .request_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        if request_timeout.is_zero() {
            return Err(SessionConfigError::InvalidTimeout);
        }

        Ok(SessionConfig {
            transport,
            document_selector,
            identity: ClientIdentity::default(),
            request_timeout,
            root_uri: self.root_uri,
        })
    }
}
