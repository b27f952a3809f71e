//! High-level LSP client
//!
//! Provides a typed API over [`JsonRpcClient`] for the parts of the
//! Language Server Protocol this shim drives: the initialize handshake,
//! document open/close and shutdown.

use crate::io::transport::Transport;
use crate::lsp::protocol::{JsonRpcClient, JsonRpcError};
use lsp_types::{
    ClientCapabilities, ClientInfo, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    InitializeParams, InitializeResult, InitializedParams, TextDocumentClientCapabilities,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentSyncClientCapabilities, Uri,
    WindowClientCapabilities,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// LSP Client Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LspError {
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("LSP client not initialized")]
    NotInitialized,

    #[error("LSP protocol error: {0}")]
    Protocol(String),

    #[error("Invalid document URI: {0}")]
    InvalidUri(String),

    #[error(
        "LSP request timeout: {method} - consider using a longer timeout or checking server responsiveness"
    )]
    RequestTimeout { method: String },
}

/// Identity the client reports in `initialize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn parse_uri(uri: &str) -> Result<Uri, LspError> {
    uri.parse()
        .map_err(|_| LspError::InvalidUri(uri.to_string()))
}

fn map_timeout(method: &str, error: JsonRpcError) -> LspError {
    match error {
        JsonRpcError::Timeout => LspError::RequestTimeout {
            method: method.to_string(),
        },
        other => LspError::JsonRpc(other),
    }
}

// ============================================================================
// High-level LSP Client
// ============================================================================

/// High-level LSP client that handles LSP protocol over any transport
pub struct LspClient<T: Transport> {
    rpc_client: JsonRpcClient<T>,

    identity: ClientIdentity,

    /// Timeout applied to `initialize` and `shutdown`
    request_timeout: Duration,

    initialized: bool,
}

impl<T: Transport + 'static> LspClient<T> {
    pub fn new(transport: T, identity: ClientIdentity, request_timeout: Duration) -> Self {
        Self {
            rpc_client: JsonRpcClient::new(transport),
            identity,
            request_timeout,
            initialized: false,
        }
    }

    fn client_capabilities() -> ClientCapabilities {
        ClientCapabilities {
            window: Some(WindowClientCapabilities {
                work_done_progress: Some(true),
                ..Default::default()
            }),
            text_document: Some(TextDocumentClientCapabilities {
                synchronization: Some(TextDocumentSyncClientCapabilities {
                    dynamic_registration: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Perform the `initialize` request and `initialized` notification
    pub async fn initialize(
        &mut self,
        root_uri: Option<String>,
    ) -> Result<InitializeResult, LspError> {
        if self.initialized {
            return Err(LspError::Protocol("Client already initialized".to_string()));
        }

        info!("Initializing LSP client");

        let root_uri = root_uri.as_deref().map(parse_uri).transpose()?;

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri,
            capabilities: Self::client_capabilities(),
            client_info: Some(ClientInfo {
                name: self.identity.name.clone(),
                version: Some(self.identity.version.clone()),
            }),
            ..Default::default()
        };

        let result: InitializeResult = self
            .rpc_client
            .request_with_timeout("initialize", Some(params), self.request_timeout)
            .await
            .map_err(|e| map_timeout("initialize", e))?;

        debug!("LSP server capabilities: {:?}", result.capabilities);
        if let Some(server_info) = &result.server_info {
            info!(
                "Connected to {} {}",
                server_info.name,
                server_info.version.as_deref().unwrap_or("")
            );
        }

        self.rpc_client
            .notify("initialized", Some(InitializedParams {}))
            .await?;

        self.initialized = true;
        info!("LSP client initialized successfully");

        Ok(result)
    }

    /// Send `shutdown` followed by `exit`
    pub async fn shutdown(&mut self) -> Result<(), LspError> {
        if !self.initialized {
            return Ok(());
        }

        info!("Shutting down LSP client");
        self.initialized = false;

        let _: () = self
            .rpc_client
            .request_with_timeout("shutdown", None::<Value>, self.request_timeout)
            .await
            .map_err(|e| map_timeout("shutdown", e))?;

        self.rpc_client.notify("exit", None::<Value>).await?;

        info!("LSP client shutdown complete");
        Ok(())
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether messages from the server are still being dispatched
    pub fn is_connected(&self) -> bool {
        self.rpc_client.is_connected()
    }

    /// Notify the server that a document was opened
    pub async fn open_text_document(
        &self,
        uri: &str,
        language_id: &str,
        version: i32,
        text: &str,
    ) -> Result<(), LspError> {
        if !self.initialized {
            return Err(LspError::NotInitialized);
        }

        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem::new(
                parse_uri(uri)?,
                language_id.to_string(),
                version,
                text.to_string(),
            ),
        };
        self.rpc_client
            .notify("textDocument/didOpen", Some(params))
            .await?;
        Ok(())
    }

    /// Notify the server that a document was closed
    pub async fn close_text_document(&self, uri: &str) -> Result<(), LspError> {
        if !self.initialized {
            return Err(LspError::NotInitialized);
        }

        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier::new(parse_uri(uri)?),
        };
        self.rpc_client
            .notify("textDocument/didClose", Some(params))
            .await?;
        Ok(())
    }

    /// Close the connection (does not stop an external process)
    pub async fn close(&mut self) -> Result<(), LspError> {
        let shutdown_result = self.shutdown().await;
        self.rpc_client.close().await?;
        shutdown_result
    }

    /// Access the JSON-RPC layer to install handlers
    pub fn rpc_client(&self) -> &JsonRpcClient<T> {
        &self.rpc_client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::{StreamKind, StreamTransport};
    use crate::lsp::testing::FakeServerConnection;

    #[cfg(feature = "test-logging")]
    #[ctor::ctor]
    fn init_test_logging() {
        crate::test_utils::logging::init();
    }

    fn client_pair() -> (LspClient<StreamTransport>, FakeServerConnection) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(client_side);
        let transport = StreamTransport::new(reader, writer, StreamKind::Generic);
        (
            LspClient::new(transport, ClientIdentity::default(), Duration::from_secs(5)),
            FakeServerConnection::new(server_side),
        )
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let (mut client, mut server) = client_pair();

        let server_task = tokio::spawn(async move {
            let initialize = server.read_message().await.unwrap();
            assert_eq!(initialize["method"], "initialize");
            assert_eq!(
                initialize["params"]["clientInfo"]["name"],
                env!("CARGO_PKG_NAME")
            );
            assert_eq!(initialize["params"]["rootUri"], "file:///work/beef");
            server
                .respond(initialize["id"].clone(), FakeServerConnection::initialize_result())
                .await;

            let initialized = server.read_message().await.unwrap();
            assert_eq!(initialized["method"], "initialized");
        });

        let result = client
            .initialize(Some("file:///work/beef".to_string()))
            .await
            .unwrap();

        assert!(client.is_initialized());
        assert!(result.capabilities.text_document_sync.is_some());
        assert_eq!(result.server_info.unwrap().name, "fake-beef-lsp");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let (mut client, mut server) = client_pair();

        tokio::spawn(async move {
            let initialize = server.read_message().await.unwrap();
            server
                .respond(initialize["id"].clone(), FakeServerConnection::initialize_result())
                .await;
            while server.read_message().await.is_some() {}
        });

        client.initialize(None).await.unwrap();
        assert!(matches!(
            client.initialize(None).await,
            Err(LspError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_document_notifications_require_initialize() {
        let (client, _server) = client_pair();

        let result = client
            .open_text_document("file:///a.bf", "bf", 1, "class A {}")
            .await;
        assert!(matches!(result, Err(LspError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_timeout_maps_to_request_timeout() {
        let (client_side, _server_side) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(client_side);
        let transport = StreamTransport::new(reader, writer, StreamKind::Generic);
        let mut client =
            LspClient::new(transport, ClientIdentity::default(), Duration::from_millis(20));

        match client.initialize(None).await {
            Err(LspError::RequestTimeout { method }) => assert_eq!(method, "initialize"),
            other => panic!("Expected timeout, got {other:?}"),
        }
        assert!(!client.is_initialized());
    }

    #[tokio::test]
    async fn test_open_close_and_shutdown_sequence() {
        let (mut client, mut server) = client_pair();

        let server_task = tokio::spawn(async move {
            let initialize = server.read_message().await.unwrap();
            server
                .respond(initialize["id"].clone(), FakeServerConnection::initialize_result())
                .await;

            let mut methods = Vec::new();
            while let Some(message) = server.read_message().await {
                let method = message["method"].as_str().unwrap_or_default().to_string();
                if method == "shutdown" {
                    server.respond(message["id"].clone(), Value::Null).await;
                }
                if method == "textDocument/didOpen" {
                    assert_eq!(message["params"]["textDocument"]["languageId"], "bf");
                }
                let done = method == "exit";
                methods.push(method);
                if done {
                    break;
                }
            }
            methods
        });

        client.initialize(None).await.unwrap();
        client
            .open_text_document("file:///src/Program.bf", "bf", 1, "class Program {}")
            .await
            .unwrap();
        client
            .close_text_document("file:///src/Program.bf")
            .await
            .unwrap();
        client.close().await.unwrap();

        let methods = server_task.await.unwrap();
        assert_eq!(
            methods,
            vec![
                "initialized",
                "textDocument/didOpen",
                "textDocument/didClose",
                "shutdown",
                "exit"
            ]
        );
        assert!(!client.is_connected());
    }
}
