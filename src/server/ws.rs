//! WebSocket transport for pull sessions

use std::io;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;

use crate::output::PullTransport;

/// A [`PullTransport`] over an upgraded WebSocket
pub struct WebSocketTransport {
    socket: WebSocket,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }

    async fn send(&mut self, message: Message) -> io::Result<()> {
        self.socket
            .send(message)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
    }
}

#[async_trait]
impl PullTransport for WebSocketTransport {
    async fn recv(&mut self) -> Option<String> {
        while let Some(message) = self.socket.recv().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by the socket itself
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive failed");
                    return None;
                }
            }
        }
        None
    }

    async fn send_binary(&mut self, data: Bytes) -> io::Result<()> {
        self.send(Message::Binary(data.to_vec())).await
    }

    async fn send_text(&mut self, text: String) -> io::Result<()> {
        self.send(Message::Text(text)).await
    }
}
