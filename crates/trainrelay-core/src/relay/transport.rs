//! Upstream transport for the job's event stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::relay::error::{RelayError, RelayResult};

/// One item from an open upstream connection. End of stream means the connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFrame {
    Text(String),
    /// Transport failure; nothing follows it.
    Error(String),
}

pub type UpstreamStream = BoxStream<'static, UpstreamFrame>;

/// Opens connections to the event stream.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Opens a new connection. Dropping the stream closes it.
    async fn connect(&self) -> RelayResult<UpstreamStream>;
}

/// WebSocket connector for the job's `/ws/training` endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self { url: url.into(), connect_timeout }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UpstreamConnector for WebSocketConnector {
    async fn connect(&self) -> RelayResult<UpstreamStream> {
        debug!(url = %self.url, "Opening training event stream");
        let (socket, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(self.url.as_str()))
                .await
                .map_err(|_| {
                    RelayError::Connect(format!(
                        "timed out after {}s connecting to {}",
                        self.connect_timeout.as_secs(),
                        self.url
                    ))
                })?
                .map_err(|e| RelayError::Connect(format!("{}: {}", self.url, e)))?;

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(UpstreamFrame::Text(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(UpstreamFrame::Text(text)),
                    Err(e) => {
                        warn!(error = %e, len = e.as_bytes().len(), "Skipping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Training event stream closed by peer");
                    None
                }
                Err(e) => Some(UpstreamFrame::Error(e.to_string())),
            }
        });
        Ok(frames.boxed())
    }
}
