//! Test helpers: an in-process fake language server
//!
//! `FakeServerConnection` speaks LSP framing over any async stream
//! (an in-memory duplex pipe or an accepted TCP socket) so client and
//! session code can be exercised without a real Beef server.

use serde_json::{Value, json};

use crate::session::config::READY_NOTIFICATION;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};

type BoxedStream = Box<dyn AsyncReadWrite>;

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<S: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for S {}

/// Server side of a framed LSP connection
pub struct FakeServerConnection {
    reader: BufReader<ReadHalf<BoxedStream>>,
    writer: WriteHalf<BoxedStream>,
}

impl FakeServerConnection {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let boxed: BoxedStream = Box::new(stream);
        let (reader, writer) = tokio::io::split(boxed);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Canned `InitializeResult` payload
    pub fn initialize_result() -> Value {
        json!({
            "capabilities": { "textDocumentSync": 1 },
            "serverInfo": { "name": "fake-beef-lsp", "version": "0.0.1" }
        })
    }

    /// Read one framed message; `None` on EOF or malformed framing
    pub async fn read_message(&mut self) -> Option<Value> {
        let mut content_length = None;
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await.ok()? == 0 {
                return None;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(value) = line.strip_prefix("Content-Length:") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }

        let mut body = vec![0u8; content_length?];
        self.reader.read_exact(&mut body).await.ok()?;
        serde_json::from_slice(&body).ok()
    }

    pub async fn send_value(&mut self, value: Value) {
        let body = value.to_string();
        let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        // Peer may already be gone in teardown tests
        let _ = self.writer.write_all(framed.as_bytes()).await;
        let _ = self.writer.flush().await;
    }

    pub async fn respond(&mut self, id: Value, result: Value) {
        self.send_value(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
            .await;
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) {
        let mut message = json!({ "jsonrpc": "2.0", "method": method });
        if let Some(params) = params {
            message["params"] = params;
        }
        self.send_value(message).await;
    }

    /// Answer `initialize`, wait for `initialized`, then optionally announce readiness
    ///
    /// Returns false if the client disconnected before the handshake finished.
    pub async fn complete_handshake(&mut self, announce_ready: bool) -> bool {
        let Some(initialize) = self.read_message().await else {
            return false;
        };
        if initialize["method"] != "initialize" {
            return false;
        }
        self.respond(initialize["id"].clone(), Self::initialize_result())
            .await;

        match self.read_message().await {
            Some(message) if message["method"] == "initialized" => {}
            _ => return false,
        }

        if announce_ready {
            self.notify(READY_NOTIFICATION, None).await;
        }
        true
    }

    /// Record every method the client sends until `exit` or EOF, answering `shutdown`
    pub async fn collect_until_exit(&mut self) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Some(message) = self.read_message().await {
            if message["method"] == "shutdown" {
                self.respond(message["id"].clone(), Value::Null).await;
            }
            let exit = message["method"] == "exit";
            messages.push(message);
            if exit {
                break;
            }
        }
        messages
    }
}
