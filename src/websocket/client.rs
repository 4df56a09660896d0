//! WebSocket transport for a single connection
//!
//! Normalizes frames and splits the stream so the supervision loop can
//! read, write keepalives, and flush queued sends concurrently.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound frame, normalized
#[derive(Debug)]
pub enum Inbound {
    /// A text payload (possibly a keepalive sentinel)
    Text(String),
    /// Protocol-level ping that needs a pong reply
    Ping(Vec<u8>),
    /// Anything else that only proves the peer is alive
    Control,
}

/// Write half of a connection
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Read half of a connection
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

/// Open a connection and split it for independent read/write
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, response) = connect_async(url)
        .await
        .map_err(|e| MarketDataError::Connection(format!("failed to connect: {e}")))?;

    debug!(status = ?response.status(), "WebSocket connected");

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

impl WsWriter {
    pub async fn send_text(&mut self, payload: &str) -> Result<()> {
        self.sink
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| MarketDataError::Message(e.to_string()))
    }

    pub async fn pong(&mut self, payload: Vec<u8>) -> Result<()> {
        self.sink
            .send(Message::Pong(payload))
            .await
            .map_err(|e| MarketDataError::Message(e.to_string()))
    }

    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

impl WsReader {
    /// Next normalized frame. A close frame, transport error, or stream end
    /// terminates the connection.
    pub async fn next(&mut self) -> Result<Inbound> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Inbound::Text(text)),
            Some(Ok(Message::Binary(data))) => {
                Ok(Inbound::Text(String::from_utf8_lossy(&data).to_string()))
            }
            Some(Ok(Message::Ping(data))) => Ok(Inbound::Ping(data)),
            Some(Ok(Message::Pong(_))) => Ok(Inbound::Control),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "received close frame");
                Err(MarketDataError::Connection("connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(Inbound::Control),
            Some(Err(e)) => Err(MarketDataError::Message(e.to_string())),
            None => Err(MarketDataError::Connection("stream ended".to_string())),
        }
    }
}
