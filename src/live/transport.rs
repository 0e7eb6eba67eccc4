//! Trait abstraction for the live feed socket to enable testing

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Result, ViewerError};

/// Opens connections to the live feed
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Establish one connection
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedLink>>;
}

/// One established, bidirectional text connection
#[async_trait]
pub trait FeedLink: Send {
    /// Send a text message
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound text message, `None` once the peer has closed
    async fn next_message(&mut self) -> Option<Result<String>>;

    /// Close the connection from our side
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket transport backed by `tokio-tungstenite`
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedLink>> {
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        debug!("WebSocket handshake with {} completed ({})", url, response.status());
        Ok(Box::new(WebSocketLink { stream }))
    }
}

/// Wrapper around a WebSocket stream that implements FeedLink
pub struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedLink for WebSocketLink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| {
                        ViewerError::Payload(format!("binary message is not UTF-8: {}", e))
                    }))
                }
                Ok(Message::Close(frame)) => {
                    debug!("Peer closed live feed: {:?}", frame);
                    return None;
                }
                // Ping/pong are answered by tungstenite itself
                Ok(other) => trace!("Ignoring control frame ({} bytes)", other.len()),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
