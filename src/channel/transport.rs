//! Push transport abstraction and its WebSocket implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use crate::error::ChannelError;
use crate::session::SessionCredentials;

/// An open link to the push server.
///
/// Dropping the link closes the underlying connection. The `inbound` receiver
/// yielding `None` means the server closed the connection or it failed.
#[derive(Debug)]
pub struct TransportLink {
    pub inbound: mpsc::Receiver<ServerMessage>,
    pub outbound: mpsc::Sender<ClientMessage>,
}

/// Opens push channel links.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn open(&self, credentials: &SessionCredentials) -> Result<TransportLink, ChannelError>;
}

/// WebSocket push transport. JSON envelopes travel as text frames.
pub struct WebSocketTransport {
    url: String,
    buffer: usize,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, buffer: usize) -> Self {
        Self {
            url: url.into(),
            buffer: buffer.max(1),
        }
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn open(&self, credentials: &SessionCredentials) -> Result<TransportLink, ChannelError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::Unavailable(format!("invalid channel url: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.token))
            .map_err(|e| ChannelError::Unavailable(format!("invalid token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| ChannelError::Unavailable(e.to_string()))?;
        info!("Push channel connected to {}", self.url);

        let (mut sink, mut source) = stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(self.buffer);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(self.buffer);

        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(message) => {
                                if inbound_tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Dropping malformed push message: {}", e),
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!("Push channel closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Push channel read error: {}", e);
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {} command: {}", message.msg_type, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Push channel write error: {}", e);
                    break;
                }
            }
            // Link dropped by the owner, close the socket.
            let _ = sink.close().await;
            reader.abort();
        });

        Ok(TransportLink {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}
