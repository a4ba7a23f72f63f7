//! WebSocket transport for the push channel

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{PushSocket, PushTransport};
use crate::error::{Error, Result};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens real WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushSocket>> {
        Ok(Box::new(PushWebSocket::connect(url).await?))
    }
}

pub struct PushWebSocket {
    stream: WsStream,
}

impl PushWebSocket {
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!("Connecting WebSocket to {}", url);

        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| Error::Transport(format!("WebSocket connection failed: {}", e)))?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }
}

#[async_trait]
impl PushSocket for PushWebSocket {
    async fn send_text(&mut self, msg: &str) -> Result<()> {
        tracing::debug!("WS send: {}", msg);
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| Error::Transport(format!("Failed to send WebSocket message: {}", e)))
    }

    /// Receive the next text frame, answering pings and skipping other
    /// control frames. `None` means the server closed the connection.
    async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => {
                        tracing::debug!("WS recv (binary): {}", text);
                        return Ok(Some(text));
                    }
                    Err(_) => tracing::debug!("WS binary frame ignored (not UTF-8)"),
                },
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| Error::Transport(format!("Failed to send pong: {}", e)))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(Error::Transport(format!("WebSocket receive error: {}", e)));
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }
}
