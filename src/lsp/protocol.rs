//! JSON-RPC 2.0 protocol layer
//!
//! Implements JSON-RPC 2.0 over a framed transport with request/response
//! matching, per-method notification dispatch and replies to
//! server-initiated requests.

use crate::io::transport::Transport;
use crate::log_lsp_message;
use crate::lsp::framing::LspFraming;
use crate::lsp::jsonrpc_utils::{self, JSONRPC_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, trace, warn};

/// Default timeout for requests sent through [`JsonRpcClient::request`]
#[cfg(test)]
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `close` waits for queued outbound messages to be written
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier
    pub id: Value,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier (matches the request)
    pub id: Value,

    /// Result (present if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error (present if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

/// JSON-RPC 2.0 notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Inbound message after classification by shape
#[derive(Debug)]
enum InboundMessage {
    Response(JsonRpcResponse),
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

impl InboundMessage {
    /// Classify a raw JSON-RPC payload
    ///
    /// `method` + non-null `id` is a request, `method` alone a notification,
    /// anything else a response.
    fn parse(message: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(message)?;
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some_and(|id| !id.is_null());

        Ok(match (has_method, has_id) {
            (true, true) => InboundMessage::Request(serde_json::from_value(value)?),
            (true, false) => InboundMessage::Notification(serde_json::from_value(value)?),
            (false, _) => InboundMessage::Response(serde_json::from_value(value)?),
        })
    }
}

// ============================================================================
// JSON-RPC Errors
// ============================================================================

/// JSON-RPC error type
#[derive(Debug, thiserror::Error)]
pub enum JsonRpcError {
    #[error("JSON-RPC server error ({code}): {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Request was cancelled")]
    RequestCancelled,

    #[error("Missing result in response")]
    MissingResult,
}

// ============================================================================
// JSON-RPC Client
// ============================================================================

/// Handler for one server-to-client notification method
pub type NotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// Handler answering server-to-client requests
pub type RequestHandler = Arc<dyn Fn(JsonRpcRequest) -> JsonRpcResponse + Send + Sync>;

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type NotificationHandlers = Arc<RwLock<HashMap<String, NotificationHandler>>>;

/// JSON-RPC client with request/response correlation
pub struct JsonRpcClient<T: Transport> {
    /// Channel for sending outbound messages (requests, notifications, replies)
    outbound_sender: mpsc::UnboundedSender<String>,

    /// Request ID counter
    request_id: AtomicU64,

    /// Pending requests waiting for responses
    pending_requests: PendingRequests,

    /// Notification handlers keyed by method (shared with dispatch task)
    notification_handlers: NotificationHandlers,

    /// Handler for server-initiated requests (shared with dispatch task)
    request_handler: Arc<RwLock<Option<RequestHandler>>>,

    /// Framed transport, shared with the dispatch task
    transport: Arc<Mutex<LspFraming<T>>>,

    /// Dispatch task moving messages between channels and the transport
    dispatch_task: Option<JoinHandle<()>>,

    /// Asks the dispatch task to flush and stop
    shutdown_sender: Option<oneshot::Sender<()>>,
}

impl<T: Transport + 'static> JsonRpcClient<T> {
    /// Create a new JSON-RPC client and start its dispatch task
    pub fn new(transport: T) -> Self {
        let transport = Arc::new(Mutex::new(LspFraming::new(transport)));
        let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
        let pending_requests: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let notification_handlers: NotificationHandlers = Arc::new(RwLock::new(HashMap::new()));
        let request_handler = Arc::new(RwLock::new(None::<RequestHandler>));

        let transport_clone = Arc::clone(&transport);
        let pending_clone = Arc::clone(&pending_requests);
        let notifications_clone = Arc::clone(&notification_handlers);
        let request_handler_clone = Arc::clone(&request_handler);
        let reply_sender = outbound_sender.clone();
        let (shutdown_sender, mut shutdown_receiver) = oneshot::channel::<()>();

        let dispatch_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Outbound messages (prioritized)
                    biased;
                    Some(message) = outbound_receiver.recv() => {
                        let mut transport = transport_clone.lock().await;
                        if let Err(e) = transport.send(&message).await {
                            error!("Failed to send message: {}", e);
                            break;
                        }
                    }
                    _ = &mut shutdown_receiver => {
                        // Flush whatever is still queued (e.g. the exit notification)
                        let mut transport = transport_clone.lock().await;
                        while let Ok(message) = outbound_receiver.try_recv() {
                            if let Err(e) = transport.send(&message).await {
                                debug!("Dropped queued message during close: {}", e);
                                break;
                            }
                        }
                        break;
                    }
                    result = async {
                        let mut transport = transport_clone.lock().await;
                        transport.receive().await
                    } => {
                        match result {
                            Ok(message) => {
                                Self::process_inbound_message(
                                    &message,
                                    &pending_clone,
                                    &notifications_clone,
                                    &request_handler_clone,
                                    &reply_sender,
                                )
                                .await;
                            }
                            Err(e) => {
                                warn!("Connection to language server lost: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            // Nobody will answer the outstanding requests now
            pending_clone.lock().await.clear();
            trace!("JSON-RPC dispatch task finished");
        });

        Self {
            outbound_sender,
            request_id: AtomicU64::new(1),
            pending_requests,
            notification_handlers,
            request_handler,
            transport,
            dispatch_task: Some(dispatch_task),
            shutdown_sender: Some(shutdown_sender),
        }
    }

    /// Register a handler for one notification method, replacing any previous one
    pub async fn on_notification<F>(&self, method: &str, handler: F)
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        self.notification_handlers
            .write()
            .await
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Set the handler for server-to-client requests
    pub async fn on_request<F>(&self, handler: F)
    where
        F: Fn(JsonRpcRequest) -> JsonRpcResponse + Send + Sync + 'static,
    {
        *self.request_handler.write().await = Some(Arc::new(handler));
    }

    async fn process_inbound_message(
        message: &str,
        pending_requests: &PendingRequests,
        notification_handlers: &NotificationHandlers,
        request_handler: &Arc<RwLock<Option<RequestHandler>>>,
        reply_sender: &mpsc::UnboundedSender<String>,
    ) {
        trace!("JsonRpcClient: Received message: {}", message);

        let inbound = match InboundMessage::parse(message) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!("Received unparseable message ({}): {}", e, message);
                return;
            }
        };

        match inbound {
            InboundMessage::Response(response) => {
                log_lsp_message!(Level::DEBUG, "incoming", "response", &response.id);
                let Some(id) = response.id.as_u64() else {
                    debug!("Received response with non-numeric id: {}", response.id);
                    return;
                };
                let sender = pending_requests.lock().await.remove(&id);
                match sender {
                    Some(sender) => {
                        if sender.send(response).is_err() {
                            debug!("Response receiver dropped for request {}", id);
                        }
                    }
                    None => debug!("Received response for unknown request {}", id),
                }
            }
            InboundMessage::Notification(notification) => {
                log_lsp_message!(
                    Level::DEBUG,
                    "incoming",
                    notification.method.as_str(),
                    &notification.params
                );
                let handler = notification_handlers
                    .read()
                    .await
                    .get(&notification.method)
                    .cloned();
                match handler {
                    Some(handler) => handler(notification),
                    None => trace!("Unhandled notification: {}", notification.method),
                }
            }
            InboundMessage::Request(request) => {
                log_lsp_message!(
                    Level::DEBUG,
                    "incoming",
                    request.method.as_str(),
                    &request.params
                );
                let handler = request_handler.read().await.clone();
                let response = match handler {
                    Some(handler) => handler(request),
                    None => jsonrpc_utils::method_not_found_response(request.id, &request.method),
                };

                match serde_json::to_string(&response) {
                    Ok(json) => {
                        if reply_sender.send(json).is_err() {
                            debug!("Outbound channel closed before reply could be sent");
                        }
                    }
                    Err(e) => error!("Failed to serialize reply: {}", e),
                }
            }
        }
    }

    /// Send a JSON-RPC request with the default timeout
    #[cfg(test)]
    pub async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, JsonRpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        self.request_with_timeout(method, params, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Send a JSON-RPC request with custom timeout
    pub async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        timeout: Duration,
    ) -> Result<R, JsonRpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (response_sender, response_receiver) = oneshot::channel();

        self.pending_requests
            .lock()
            .await
            .insert(id, response_sender);

        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::Number(serde_json::Number::from(id)),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };

        let request_json = serde_json::to_string(&request).map_err(JsonRpcError::Serialization)?;
        log_lsp_message!(Level::DEBUG, "outgoing", method, &request.params);

        if self.outbound_sender.send(request_json).is_err() {
            self.pending_requests.lock().await.remove(&id);
            return Err(JsonRpcError::Transport(
                "Outbound channel closed".to_string(),
            ));
        }

        let response = match tokio::time::timeout(timeout, response_receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.pending_requests.lock().await.remove(&id);
                return Err(JsonRpcError::RequestCancelled);
            }
            Err(_) => {
                self.pending_requests.lock().await.remove(&id);
                return Err(JsonRpcError::Timeout);
            }
        };

        if let Some(error) = response.error {
            return Err(JsonRpcError::Server {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        match response.result {
            Some(result) => serde_json::from_value(result).map_err(JsonRpcError::Deserialization),
            // LSP servers sometimes omit a null result entirely (e.g. shutdown)
            None => serde_json::from_value(Value::Null).map_err(|_| JsonRpcError::MissingResult),
        }
    }

    /// Send a JSON-RPC notification
    pub async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<(), JsonRpcError>
    where
        P: Serialize,
    {
        let notification = JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };

        let notification_json =
            serde_json::to_string(&notification).map_err(JsonRpcError::Serialization)?;
        log_lsp_message!(Level::DEBUG, "outgoing", method, &notification.params);

        self.outbound_sender
            .send(notification_json)
            .map_err(|_| JsonRpcError::Transport("Outbound channel closed".to_string()))
    }

    /// Whether the dispatch task is still moving messages
    pub fn is_connected(&self) -> bool {
        self.dispatch_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Drop all pending requests; their callers observe `RequestCancelled`
    pub async fn cleanup_pending_requests(&self) {
        let mut pending = self.pending_requests.lock().await;
        for (id, _) in pending.drain() {
            debug!("JsonRpcClient: Cancelling pending request ID {}", id);
        }
    }

    /// Close the connection: cancel pending requests, stop dispatch, close the transport
    pub async fn close(&mut self) -> Result<(), JsonRpcError> {
        self.cleanup_pending_requests().await;

        if let Some(shutdown) = self.shutdown_sender.take() {
            let _ = shutdown.send(());
        }

        if let Some(mut task) = self.dispatch_task.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("JSON-RPC dispatch task did not stop in time, aborting");
                task.abort();
            }
        }

        self.transport
            .lock()
            .await
            .close()
            .await
            .map_err(|e| JsonRpcError::Transport(e.to_string()))
    }
}

impl<T: Transport> Drop for JsonRpcClient<T> {
    fn drop(&mut self) {
        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
    }
}
