//! Beef language session lifecycle
//!
//! A [`Session`] owns one connection to the Beef language server and the
//! status item that mirrors it. The connection is opened on a background
//! task so `start` returns immediately; readiness is the server's
//! `beef/initialized` notification.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use lsp_types::{LogMessageParams, MessageType, Uri};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::host::StatusBarItem;
use crate::io::{
    ChildProcessManager, ProcessManager, StderrMonitor, StopMode, StreamTransport,
};
use crate::lsp::jsonrpc_utils;
use crate::lsp::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LspClient, LspError};
use crate::session::config::{READY_NOTIFICATION, SessionConfig, TransportConfig};
use crate::session::error::SessionError;
use crate::session::selector::TextDocument;
use crate::session::status::SessionStatus;

/// Log target for messages relayed from the language server
const SERVER_LOG_TARGET: &str = "beef_lsp::server";

// ============================================================================
// Session Phase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, `start` not called yet
    Idle,
    /// Transport opening or handshake in progress, or waiting for readiness
    Connecting,
    /// `beef/initialized` received
    Ready,
    /// `stop` called; terminal
    Stopped,
}

// ============================================================================
// Shared State
// ============================================================================

/// Live connection, present once the handshake completed
struct Connection {
    client: LspClient<StreamTransport>,

    /// Spawned server, absent in TCP mode
    process: Option<ChildProcessManager>,
}

/// Connection plus the documents routed to it
///
/// Both live under one lock so a document is announced exactly once,
/// whether it arrives before or after the handshake.
#[derive(Default)]
struct SessionLink {
    connection: Option<Connection>,
    documents: BTreeMap<String, TextDocument>,
}

/// State touched from notification handlers and the connect task
struct SessionShared {
    status: Mutex<SessionStatus>,
    phase: watch::Sender<SessionPhase>,
    last_error: Mutex<Option<Arc<SessionError>>>,
}

impl SessionShared {
    /// Connecting -> Ready, at most once
    fn mark_ready(&self) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let mut status = self.status.lock().unwrap();
        let became_ready = self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Connecting {
                *phase = SessionPhase::Ready;
                true
            } else {
                false
            }
        });

        if became_ready {
            info!("Beef language server is ready");
            status.show_running();
        } else {
            trace!("Ignoring {} outside of Connecting", READY_NOTIFICATION);
        }
    }

    fn record_error(&self, error: SessionError) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.last_error.lock().unwrap() = Some(Arc::new(error));
    }
}

// ============================================================================
// Session
// ============================================================================

/// One activation's connection to the Beef language server
pub struct Session {
    config: SessionConfig,

    shared: Arc<SessionShared>,

    link: Arc<AsyncMutex<SessionLink>>,

    /// Opens the transport and performs the handshake
    connect_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Create an idle session; the status item stays hidden until `start`
    pub fn new(config: SessionConfig, status_item: Box<dyn StatusBarItem>) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Self {
            config,
            shared: Arc::new(SessionShared {
                status: Mutex::new(SessionStatus::new(status_item)),
                phase,
                last_error: Mutex::new(None),
            }),
            link: Arc::new(AsyncMutex::new(SessionLink::default())),
            connect_task: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.borrow()
    }

    /// Receiver observing every phase transition
    #[cfg(test)]
    pub fn phase_watch(&self) -> watch::Receiver<SessionPhase> {
        self.shared.phase.subscribe()
    }

    /// Resolves once the server announced readiness
    ///
    /// Fails with [`SessionError::Stopped`] if the session stops first.
    /// There is no timeout: a session that never connects never resolves.
    pub async fn ready(&self) -> Result<(), SessionError> {
        let mut phase = self.shared.phase.subscribe();
        let reached = *phase
            .wait_for(|phase| matches!(phase, SessionPhase::Ready | SessionPhase::Stopped))
            .await
            .map_err(|_| SessionError::Stopped)?;

        match reached {
            SessionPhase::Ready => Ok(()),
            _ => Err(SessionError::Stopped),
        }
    }

    /// Most recent connection or handshake failure
    pub fn last_error(&self) -> Option<Arc<SessionError>> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.shared.last_error.lock().unwrap().clone()
    }

    /// Whether the LSP handshake completed and the connection is held
    #[cfg(test)]
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.connection.is_some()
    }

    /// Whether the document selector accepts this document
    pub fn routes(&self, document: &TextDocument) -> bool {
        self.config.document_selector.matches(document)
    }

    /// Show "starting" and begin connecting in the background
    ///
    /// Exactly one transport is attempted, without retry. Failures are
    /// logged and kept in [`Session::last_error`]; the phase stays
    /// `Connecting` until `stop`.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.phase() {
            SessionPhase::Idle => {}
            SessionPhase::Stopped => return Err(SessionError::Stopped),
            SessionPhase::Connecting | SessionPhase::Ready => {
                return Err(SessionError::AlreadyStarted);
            }
        }

        info!(
            "Starting Beef language session ({})",
            self.config.transport.describe()
        );

        self.shared.phase.send_replace(SessionPhase::Connecting);
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.shared.status.lock().unwrap().show_starting();

        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let link = Arc::clone(&self.link);

        self.connect_task = Some(tokio::spawn(async move {
            match connect(config, Arc::clone(&shared), link).await {
                Ok(()) => debug!("Beef language session connected"),
                Err(e) => {
                    error!("Failed to start Beef language session: {}", e);
                    shared.record_error(e);
                }
            }
        }));

        Ok(())
    }

    /// Route a document to the session
    ///
    /// Returns false for documents the selector rejects. Accepted documents
    /// are announced with `didOpen` now if connected, else right after the
    /// handshake. A URI that does not parse is rejected before tracking.
    pub async fn open_document(&self, document: TextDocument) -> Result<bool, SessionError> {
        if !self.routes(&document) {
            trace!(
                "Not routing {} (language '{}')",
                document.uri, document.language_id
            );
            return Ok(false);
        }
        if self.phase() == SessionPhase::Stopped {
            return Err(SessionError::Stopped);
        }
        if document.uri.parse::<Uri>().is_err() {
            return Err(LspError::InvalidUri(document.uri).into());
        }

        let mut link = self.link.lock().await;
        if link.documents.contains_key(&document.uri) {
            debug!("Document already open: {}", document.uri);
            return Ok(true);
        }

        match &link.connection {
            Some(connection) => {
                connection
                    .client
                    .open_text_document(
                        &document.uri,
                        &document.language_id,
                        document.version,
                        &document.text,
                    )
                    .await?;
            }
            None => debug!("Deferring didOpen for {} until connected", document.uri),
        }

        link.documents.insert(document.uri.clone(), document);
        Ok(true)
    }

    /// Stop tracking a document, sending `didClose` if it was announced
    ///
    /// Returns false if the document was never routed here.
    pub async fn close_document(&self, uri: &str) -> Result<bool, SessionError> {
        let mut link = self.link.lock().await;
        if link.documents.remove(uri).is_none() {
            return Ok(false);
        }

        if let Some(connection) = &link.connection {
            connection.client.close_text_document(uri).await?;
        }
        Ok(true)
    }

    /// Tear the session down; never fails
    ///
    /// Hides and disposes the status item first, then cancels an in-flight
    /// connection attempt, performs `shutdown`/`exit` if the handshake
    /// completed and stops a spawned server. A server that failed
    /// `shutdown` is killed without waiting.
    pub async fn stop(&mut self) {
        let previous = self.shared.phase.send_replace(SessionPhase::Stopped);
        if previous == SessionPhase::Stopped {
            return;
        }
        info!("Stopping Beef language session");

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.shared.status.lock().unwrap().teardown();

        if let Some(task) = self.connect_task.take() {
            if !task.is_finished() {
                debug!("Cancelling in-flight connection attempt");
                task.abort();
            }
            let _ = task.await;
        }

        let connection = {
            let mut link = self.link.lock().await;
            link.documents.clear();
            link.connection.take()
        };

        if let Some(Connection {
            mut client,
            process,
        }) = connection
        {
            let was_connected = client.is_connected();
            let closed_cleanly = match client.close().await {
                Ok(()) => true,
                Err(e) if was_connected => {
                    warn!("Error while closing LSP connection: {}", e);
                    false
                }
                Err(e) => {
                    debug!("Server already disconnected: {}", e);
                    false
                }
            };

            if let Some(mut process) = process {
                if process.is_running() {
                    // A server that did not acknowledge shutdown is not waited on
                    let mode = if closed_cleanly {
                        StopMode::Graceful
                    } else {
                        StopMode::Force
                    };
                    if let Err(e) = process.stop(mode).await {
                        warn!("Error while stopping language server process: {}", e);
                    }
                }
            }
        }

        info!("Beef language session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if matches!(
            self.phase(),
            SessionPhase::Connecting | SessionPhase::Ready
        ) {
            warn!("Session dropped without stop() - connection is torn down forcefully");
        }
    }
}

// ============================================================================
// Connection Setup
// ============================================================================

async fn connect(
    config: SessionConfig,
    shared: Arc<SessionShared>,
    link: Arc<AsyncMutex<SessionLink>>,
) -> Result<(), SessionError> {
    let (transport, process) = open_transport(&config.transport).await?;

    debug!("Creating LSP client");
    let mut client = LspClient::new(transport, config.identity.clone(), config.request_timeout);

    // Readiness may arrive as soon as the server sees `initialized`
    install_handlers(&client, shared).await;

    client.initialize(config.root_uri.clone()).await?;

    let mut link = link.lock().await;
    for document in link.documents.values() {
        if let Err(e) = client
            .open_text_document(
                &document.uri,
                &document.language_id,
                document.version,
                &document.text,
            )
            .await
        {
            warn!("Failed to open {}: {}", document.uri, e);
        }
    }
    link.connection = Some(Connection { client, process });

    Ok(())
}

async fn open_transport(
    transport: &TransportConfig,
) -> Result<(StreamTransport, Option<ChildProcessManager>), SessionError> {
    match transport {
        TransportConfig::Spawn {
            command,
            args,
            working_directory,
        } => {
            let mut process =
                ChildProcessManager::new(command.clone(), args.clone(), working_directory.clone());
            process.on_stderr_line(|line| {
                debug!(target: SERVER_LOG_TARGET, "stderr: {}", line);
            });

            process.start().await?;
            let transport = process.create_stdio_transport()?;
            Ok((transport, Some(process)))
        }
        TransportConfig::Dial { host, port } => {
            debug!("Connecting to {}:{}", host, port);
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|source| SessionError::Connect {
                    address: format!("{host}:{port}"),
                    source,
                })?;
            info!("Connected to language server at {}:{}", host, port);
            Ok((StreamTransport::from_tcp(stream), None))
        }
    }
}

async fn install_handlers(client: &LspClient<StreamTransport>, shared: Arc<SessionShared>) {
    let rpc = client.rpc_client();

    rpc.on_notification(READY_NOTIFICATION, move |_| shared.mark_ready())
        .await;
    rpc.on_notification("window/logMessage", forward_server_message)
        .await;
    rpc.on_notification("window/showMessage", forward_server_message)
        .await;
    rpc.on_request(server_request_reply).await;
}

/// Relay `window/logMessage` and `window/showMessage` into tracing
fn forward_server_message(notification: JsonRpcNotification) {
    let Some(params) = notification.params else {
        return;
    };
    let params: LogMessageParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => {
            debug!("Malformed {} params: {}", notification.method, e);
            return;
        }
    };

    let message = params.message.trim_end();
    if params.typ == MessageType::ERROR {
        error!(target: SERVER_LOG_TARGET, "{}", message);
    } else if params.typ == MessageType::WARNING {
        warn!(target: SERVER_LOG_TARGET, "{}", message);
    } else if params.typ == MessageType::INFO {
        info!(target: SERVER_LOG_TARGET, "{}", message);
    } else {
        debug!(target: SERVER_LOG_TARGET, "{}", message);
    }
}

/// Reply to a server-to-client request
///
/// Progress and capability registration are acknowledged with `null`;
/// anything else is `MethodNotFound`.
pub fn server_request_reply(request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "window/workDoneProgress/create"
        | "client/registerCapability"
        | "client/unregisterCapability" => {
            debug!("Acknowledging {} request {}", request.method, request.id);
            jsonrpc_utils::null_success_response(request.id)
        }
        method => {
            debug!("Rejecting unsupported server request: {}", method);
            jsonrpc_utils::method_not_found_response(request.id, method)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
