//! LSP message framing layer
//!
//! Handles LSP-specific message framing using Content-Length headers
//! as specified in the Language Server Protocol specification.
//!
//! LSP message framing format:
//! Content-Length: <length>\r\n\r\n<content>

use crate::io::transport::Transport;
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::trace;

/// Error types for LSP framing
#[derive(Debug, thiserror::Error)]
pub enum LspFramingError<T: std::error::Error + Send + Sync + 'static> {
    #[error("Transport error: {0}")]
    Transport(T),

    #[error("Invalid LSP message format: {0}")]
    InvalidFormat(String),

    #[error("Invalid content length: {0}")]
    InvalidContentLength(String),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Maximum message size to prevent memory exhaustion
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB

const HEADER_SEPARATOR: &str = "\r\n\r\n";

/// LSP message framing wrapper
///
/// Wraps any transport to handle LSP message framing with Content-Length headers.
/// The underlying transport deals in raw string chunks; this wrapper turns
/// them into whole JSON payloads and back.
pub struct LspFraming<T: Transport> {
    /// Underlying transport
    transport: T,

    /// Buffer for accumulating partial messages
    receive_buffer: String,

    /// Queue of complete messages ready to be returned
    message_queue: VecDeque<String>,
}

impl<T: Transport> LspFraming<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            receive_buffer: String::new(),
            message_queue: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Parse one LSP message from the receive buffer
    ///
    /// Returns Some(message) if a complete message was parsed,
    /// None if more data is needed.
    fn try_parse_message(&mut self) -> Result<Option<String>, LspFramingError<T::Error>> {
        let Some(header_end) = self.receive_buffer.find(HEADER_SEPARATOR) else {
            return Ok(None);
        };

        let content_start = header_end + HEADER_SEPARATOR.len();
        let content_length = parse_content_length(&self.receive_buffer[..header_end])?;

        let available_content = self.receive_buffer.len() - content_start;
        if available_content < content_length {
            trace!(
                "LspFraming: Incomplete message - need {} more bytes",
                content_length - available_content
            );
            return Ok(None);
        }

        let content_end = content_start + content_length;
        if !self.receive_buffer.is_char_boundary(content_end) {
            return Err(LspFramingError::InvalidFormat(format!(
                "Content-Length {content_length} splits a UTF-8 character"
            )));
        }

        let message = self.receive_buffer[content_start..content_end].to_string();
        self.receive_buffer.drain(..content_end);

        trace!(
            "LspFraming: Parsed complete message ({} bytes)",
            content_length
        );
        Ok(Some(message))
    }

    /// Read one chunk from the transport and queue every complete message in it
    async fn process_transport_data(&mut self) -> Result<(), LspFramingError<T::Error>> {
        let new_data = self
            .transport
            .receive()
            .await
            .map_err(LspFramingError::Transport)?;

        self.receive_buffer.push_str(&new_data);

        while let Some(message) = self.try_parse_message()? {
            self.message_queue.push_back(message);
        }

        Ok(())
    }
}

/// Parse Content-Length from LSP headers
///
/// Header names are case-insensitive; other headers (Content-Type) are ignored.
fn parse_content_length<E>(header: &str) -> Result<usize, LspFramingError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    for line in header.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("content-length") {
            continue;
        }

        let value = value.trim();
        let length = value
            .parse::<usize>()
            .map_err(|_| LspFramingError::InvalidContentLength(value.to_string()))?;

        if length > MAX_MESSAGE_SIZE {
            return Err(LspFramingError::MessageTooLarge {
                size: length,
                max: MAX_MESSAGE_SIZE,
            });
        }

        return Ok(length);
    }

    Err(LspFramingError::InvalidFormat(
        "Missing Content-Length header".to_string(),
    ))
}

#[async_trait]
impl<T: Transport> Transport for LspFraming<T> {
    type Error = LspFramingError<T::Error>;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        let framed_message = format!("Content-Length: {}\r\n\r\n{}", message.len(), message);

        trace!(
            "LspFraming: Sending framed message ({} bytes content)",
            message.len()
        );

        self.transport
            .send(&framed_message)
            .await
            .map_err(LspFramingError::Transport)
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        loop {
            if let Some(message) = self.message_queue.pop_front() {
                return Ok(message);
            }

            // Errors here include transport disconnects
            self.process_transport_data().await?;
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.transport
            .close()
            .await
            .map_err(LspFramingError::Transport)
    }
}
