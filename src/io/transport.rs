//! Transport layer - Pure I/O abstraction for message exchange
//!
//! This module provides the core transport abstraction that handles
//! bidirectional message exchange without knowledge of message format
//! or how the underlying stream was obtained (child stdio or a socket).

use async_trait::async_trait;
#[cfg(test)]
use std::collections::VecDeque;
use std::io;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

// ============================================================================
// Constants
// ============================================================================

/// Size of the read buffer for stream reading operations
const READ_BUFFER_SIZE: usize = 4096;

/// Default capacity for UTF-8 accumulation buffer
const UTF8_ACCUMULATION_BUFFER_CAPACITY: usize = 8192;

/// Core transport trait for bidirectional message exchange
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a message (raw string)
    async fn send(&mut self, message: &str) -> Result<(), Self::Error>;

    /// Receive a message (raw string)
    async fn receive(&mut self) -> Result<String, Self::Error>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), Self::Error>;
}

// ============================================================================
// Stream Transport Implementation
// ============================================================================

/// Error types for stream transport
#[derive(Debug, thiserror::Error)]
pub enum StreamTransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Where the byte stream of a [`StreamTransport`] comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard streams of a spawned child process
    ChildStdio,
    /// A connected TCP socket used for both directions
    Tcp,
    /// In-memory pipes
    #[cfg(test)]
    Generic,
}

/// Transport over an arbitrary async reader/writer pair
///
/// Reading and writing run on background tasks so the transport never
/// blocks the runtime. The same implementation serves a child's
/// stdin/stdout and the two halves of a TCP socket.
#[derive(Debug)]
pub struct StreamTransport {
    /// Channel for sending messages to the writer task
    outbound_sender: Option<mpsc::UnboundedSender<String>>,

    /// Channel for receiving chunks from the reader task
    inbound_receiver: Option<mpsc::UnboundedReceiver<String>>,

    /// Reader task handle, aborted on close
    reader_task: Option<JoinHandle<()>>,

    /// Origin of the stream, for diagnostics
    kind: StreamKind,

    /// Connection status
    connected: bool,
}

/// Internal state for the reader task that handles byte accumulation
struct ReaderState {
    /// Buffer for accumulating raw bytes before UTF-8 conversion
    byte_buffer: Vec<u8>,

    /// Buffer capacity to avoid frequent reallocations
    buffer_capacity: usize,
}

impl ReaderState {
    fn new() -> Self {
        Self {
            byte_buffer: Vec::with_capacity(UTF8_ACCUMULATION_BUFFER_CAPACITY),
            buffer_capacity: UTF8_ACCUMULATION_BUFFER_CAPACITY,
        }
    }

    fn add_bytes(&mut self, bytes: &[u8]) {
        self.byte_buffer.extend_from_slice(bytes);
    }

    /// Take the longest valid UTF-8 prefix out of the buffer
    ///
    /// A trailing partial code point stays buffered until the rest of its
    /// bytes arrive. An invalid sequence at the front is consumed and
    /// yielded as U+FFFD.
    fn extract_valid_utf8(&mut self) -> Option<Vec<u8>> {
        if self.byte_buffer.is_empty() {
            return None;
        }

        match std::str::from_utf8(&self.byte_buffer) {
            Ok(_) => Some(self.byte_buffer.drain(..).collect()),
            Err(e) => match (e.valid_up_to(), e.error_len()) {
                (0, None) => None,
                (0, Some(invalid_len)) => {
                    warn!(
                        "StreamTransport: replacing {} invalid UTF-8 byte(s) from stream",
                        invalid_len
                    );
                    self.byte_buffer.drain(..invalid_len);
                    Some(char::REPLACEMENT_CHARACTER.to_string().into_bytes())
                }
                (valid_end, _) => Some(self.byte_buffer.drain(..valid_end).collect()),
            },
        }
    }

    fn compact(&mut self) {
        if self.byte_buffer.capacity() > self.buffer_capacity * 2 {
            self.byte_buffer.shrink_to(self.buffer_capacity);
        }
    }
}

impl StreamTransport {
    /// Create a transport from any reader/writer pair
    pub fn new<R, W>(reader: R, writer: W, kind: StreamKind) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel();
        let (inbound_sender, inbound_receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::writer_task(writer, outbound_receiver));
        let reader_task = tokio::spawn(Self::reader_task(reader, inbound_sender));

        debug!("StreamTransport: created {:?} transport", kind);

        Self {
            outbound_sender: Some(outbound_sender),
            inbound_receiver: Some(inbound_receiver),
            reader_task: Some(reader_task),
            kind,
            connected: true,
        }
    }

    /// Create a transport from child process streams
    pub fn from_child(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self::new(stdout, stdin, StreamKind::ChildStdio)
    }

    /// Create a transport that uses a connected socket for both directions
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, StreamKind::Tcp)
    }

    /// Background task that writes queued messages to the stream
    async fn writer_task<W>(mut writer: W, mut receiver: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        while let Some(message) = receiver.recv().await {
            trace!(
                "StreamTransport: Writing message (length: {})",
                message.len()
            );

            if let Err(e) = writer.write_all(message.as_bytes()).await {
                error!("Failed to write to stream: {}", e);
                break;
            }

            if let Err(e) = writer.flush().await {
                error!("Failed to flush stream: {}", e);
                break;
            }
        }

        // Sender dropped: half-close so the peer sees EOF
        let _ = writer.shutdown().await;
        trace!("StreamTransport: writer task finished");
    }

    /// Background task that reads the stream with byte-safe UTF-8 handling
    async fn reader_task<R>(reader: R, sender: mpsc::UnboundedSender<String>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut reader = BufReader::new(reader);
        let mut state = ReaderState::new();
        let mut read_buffer = Box::new([0u8; READ_BUFFER_SIZE]);

        loop {
            match reader.read(read_buffer.as_mut()).await {
                Ok(0) => {
                    Self::handle_eof(&mut state, &sender);
                    break;
                }
                Ok(n) => {
                    state.add_bytes(&read_buffer[..n]);

                    while let Some(valid_bytes) = state.extract_valid_utf8() {
                        match String::from_utf8(valid_bytes) {
                            Ok(data) => {
                                if sender.send(data).is_err() {
                                    trace!("StreamTransport: receiver dropped, stopping reader");
                                    return;
                                }
                            }
                            Err(e) => {
                                error!("StreamTransport: Failed to convert validated UTF-8: {}", e);
                                break;
                            }
                        }
                    }

                    state.compact();
                }
                Err(e) => {
                    error!("Failed to read from stream: {}", e);
                    break;
                }
            }
        }

        trace!("StreamTransport: reader task finished");
    }

    fn handle_eof(state: &mut ReaderState, sender: &mpsc::UnboundedSender<String>) {
        trace!("StreamTransport: reader reached EOF");

        if let Some(final_bytes) = state.extract_valid_utf8() {
            match String::from_utf8(final_bytes) {
                Ok(final_string) => {
                    if !final_string.is_empty() && sender.send(final_string).is_err() {
                        trace!("StreamTransport: receiver dropped during EOF processing");
                    }
                }
                Err(e) => error!("StreamTransport: Invalid UTF-8 in final bytes: {}", e),
            }
        }

        if !state.byte_buffer.is_empty() {
            error!(
                "StreamTransport: {} incomplete bytes remaining at EOF",
                state.byte_buffer.len()
            );
        }
    }
}

#[async_trait]
impl Transport for StreamTransport {
    type Error = StreamTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(StreamTransportError::Disconnected);
        }

        let sender = self
            .outbound_sender
            .as_ref()
            .ok_or(StreamTransportError::Disconnected)?;

        sender
            .send(message.to_string())
            .map_err(|e| StreamTransportError::Channel(e.to_string()))
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        if !self.connected {
            return Err(StreamTransportError::Disconnected);
        }

        let receiver = self
            .inbound_receiver
            .as_mut()
            .ok_or(StreamTransportError::Disconnected)?;

        match receiver.recv().await {
            Some(data) => Ok(data),
            None => {
                // Reader task ended (EOF or read error)
                self.connected = false;
                Err(StreamTransportError::Disconnected)
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        debug!("StreamTransport: closing {:?} transport", self.kind);
        self.connected = false;
        self.outbound_sender.take();
        self.inbound_receiver.take();
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        Ok(())
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

/// Error type for mock transport
#[cfg(test)]
#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("Transport is disconnected")]
    Disconnected,
    #[error("No more responses available")]
    NoMoreResponses,
}

/// Mock transport for testing - allows controlling sent/received messages
#[cfg(test)]
pub struct MockTransport {
    /// Messages that were sent via this transport
    sent_messages: Arc<Mutex<Vec<String>>>,

    /// Predefined responses to return when receive() is called
    responses: Arc<Mutex<VecDeque<String>>>,

    /// Connection status
    connected: bool,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent_messages: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            connected: true,
        }
    }

    /// Create a mock transport with predefined responses
    pub fn with_responses(responses: Vec<String>) -> Self {
        let transport = Self::new();
        transport.responses.lock().unwrap().extend(responses);
        transport
    }

    /// Get all messages that were sent via this transport
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent_messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.sent_messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .ok_or(MockTransportError::NoMoreResponses)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_child_stdio_transport_echo() {
        let mut child = Command::new("echo")
            .arg("hello world")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn echo command");

        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();

        let mut transport = StreamTransport::from_child(stdin, stdout);
        assert_eq!(transport.kind, StreamKind::ChildStdio);

        let output = transport.receive().await.unwrap();
        assert_eq!(output.trim(), "hello world");

        transport.close().await.unwrap();
        assert!(!transport.connected);
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_tcp_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            socket.write_all(b"pong").await.unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut transport = StreamTransport::from_tcp(stream);
        assert_eq!(transport.kind, StreamKind::Tcp);

        transport.send("ping").await.unwrap();
        let reply = transport.receive().await.unwrap();
        assert_eq!(reply, "pong");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_transport_reports_eof_as_disconnect() {
        let (client, server) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let mut transport = StreamTransport::new(reader, writer, StreamKind::Generic);

        drop(server);

        let result = transport.receive().await;
        assert!(matches!(result, Err(StreamTransportError::Disconnected)));
        assert!(!transport.connected);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (client, _server) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let mut transport = StreamTransport::new(reader, writer, StreamKind::Generic);

        transport.close().await.unwrap();
        assert!(matches!(
            transport.send("late").await,
            Err(StreamTransportError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_mock_transport_send_receive() {
        let mut transport =
            MockTransport::with_responses(vec!["response1".to_string(), "response2".to_string()]);

        transport.send("message1").await.unwrap();
        transport.send("message2").await.unwrap();

        assert_eq!(transport.receive().await.unwrap(), "response1");
        assert_eq!(transport.receive().await.unwrap(), "response2");
        assert_eq!(transport.sent_messages(), vec!["message1", "message2"]);

        assert!(transport.receive().await.is_err());
    }

    #[test]
    fn test_reader_state_mixed_boundaries() {
        let mut state = ReaderState::new();

        state.add_bytes("Hello ".as_bytes());
        let hello = state.extract_valid_utf8().expect("Should extract 'Hello '");
        assert_eq!(String::from_utf8(hello).unwrap(), "Hello ");

        // First two bytes of "世"
        state.add_bytes(&[0xE4, 0xB8]);
        assert!(state.extract_valid_utf8().is_none());

        // Rest of "世" plus a partial "界"
        state.add_bytes(&[0x96, 0xE7, 0x95]);
        let shi = state.extract_valid_utf8().expect("Should extract '世'");
        assert_eq!(String::from_utf8(shi).unwrap(), "世");

        state.add_bytes(&[0x8C]);
        let jie = state.extract_valid_utf8().expect("Should extract '界'");
        assert_eq!(String::from_utf8(jie).unwrap(), "界");

        assert!(state.byte_buffer.is_empty());
    }

    #[test]
    fn test_reader_state_skips_invalid_bytes() {
        let mut state = ReaderState::new();

        state.add_bytes(b"\xFFContent-Length: 2\r\n\r\n{}");
        let replaced = state.extract_valid_utf8().expect("Should consume the invalid byte");
        assert_eq!(String::from_utf8(replaced).unwrap(), "\u{FFFD}");

        let rest = state.extract_valid_utf8().expect("Should extract the header");
        assert_eq!(String::from_utf8(rest).unwrap(), "Content-Length: 2\r\n\r\n{}");
        assert!(state.extract_valid_utf8().is_none());

        // Invalid byte in the middle: the valid prefix comes out first
        state.add_bytes(b"ab\xC0cd");
        let mut chunks = Vec::new();
        while let Some(bytes) = state.extract_valid_utf8() {
            chunks.push(String::from_utf8(bytes).unwrap());
        }
        assert_eq!(chunks, vec!["ab", "\u{FFFD}", "cd"]);
    }

    #[tokio::test]
    async fn test_invalid_byte_does_not_stall_reader() {
        let (client, mut server) = tokio::io::duplex(256);
        let (reader, writer) = tokio::io::split(client);
        let mut transport = StreamTransport::new(reader, writer, StreamKind::Generic);

        server
            .write_all(b"\xFFContent-Length: 2\r\n\r\n{}")
            .await
            .unwrap();

        let mut received = String::new();
        while !received.ends_with("{}") {
            let chunk = tokio::time::timeout(Duration::from_secs(2), transport.receive())
                .await
                .expect("reader stalled after an invalid byte")
                .unwrap();
            received.push_str(&chunk);
        }
        assert_eq!(received, "\u{FFFD}Content-Length: 2\r\n\r\n{}");

        server.write_all(b"later").await.unwrap();
        let later = tokio::time::timeout(Duration::from_secs(2), transport.receive())
            .await
            .expect("reader stalled on later data")
            .unwrap();
        assert_eq!(later, "later");
    }
}
