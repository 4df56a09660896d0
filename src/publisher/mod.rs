//! Publisher module for IPC communication
//!
//! Publishes the derived views to the presentation layer over a Unix
//! socket. Publish failures never propagate; the feed must stay alive even
//! when no consumer is listening.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::book::BookView;
use crate::candles::CandleSnapshot;
use crate::error::{MarketDataError, Result};

/// One update frame on the IPC socket
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamUpdate<'a> {
    Book(&'a BookView),
    Candles(&'a [CandleSnapshot]),
}

impl StreamUpdate<'_> {
    fn kind(&self) -> &'static str {
        match self {
            StreamUpdate::Book(_) => "book",
            StreamUpdate::Candles(_) => "candles",
        }
    }
}

/// Publisher for sending derived views via Unix socket
pub struct Publisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl Publisher {
    /// Create a new publisher
    pub async fn new(socket_path: &str) -> Result<Self> {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        // Try initial connection (may fail if the consumer isn't ready)
        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        Ok(publisher)
    }

    /// Connect to the Unix socket
    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(MarketDataError::Publish(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            MarketDataError::Publish(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        let mut guard = self.stream.lock().await;
        *guard = Some(stream);

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    /// Publish one update frame: MessagePack payload behind a 4-byte
    /// big-endian length prefix
    pub async fn publish(&self, update: &StreamUpdate<'_>) -> Result<()> {
        let data = rmp_serde::to_vec_named(update)
            .map_err(|e| MarketDataError::Publish(format!("Failed to serialize: {e}")))?;

        let mut message = BytesMut::with_capacity(4 + data.len());
        message.put_u32(data.len() as u32);
        message.put_slice(&data);

        let mut guard = self.stream.lock().await;

        // Reconnect lazily if the consumer came back
        if guard.is_none() {
            drop(guard);
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Failed to reconnect to IPC socket");
                return Ok(()); // Don't fail on publish errors
            }
            guard = self.stream.lock().await;
        }

        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&message).await {
                Ok(_) => {
                    debug!(kind = update.kind(), "Published update");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    *guard = None; // Mark as disconnected
                }
            }
        }

        Ok(())
    }
}
