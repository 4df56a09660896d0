//! Connection supervision
//!
//! Owns the subscribe handshake, keepalive, staleness detection, and
//! reconnect-with-backoff for one channel. Both the market and the user
//! channel run the same loop with different subscribe payloads.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, timeout, Instant};
use tracing::{info, warn};

use super::client::{self, Inbound};
use crate::error::{MarketDataError, Result};
use crate::messages::{KEEPALIVE_PING, KEEPALIVE_PONG};

/// Connection lifecycle, broadcast to interested components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Per-channel connection settings
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub label: &'static str,
    pub url: String,
    /// Sent immediately on every (re)connect
    pub subscribe_payload: String,
    pub ping_interval: Duration,
    pub stale_after: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Cloneable handle for queuing outbound payloads and watching status
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<String>,
    status: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Queue a payload. Sent immediately when connected; otherwise it waits
    /// in the queue and is flushed in order after the next (re)connect.
    pub fn send(&self, payload: impl Into<String>) {
        let _ = self.outbound.send(payload.into());
    }

    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }
}

/// Supervises one connection indefinitely
pub struct ConnectionManager {
    config: ChannelConfig,
    outbound: mpsc::UnboundedReceiver<String>,
    status: watch::Sender<ConnectionState>,
    failures: u32,
}

impl ConnectionManager {
    pub fn new(config: ChannelConfig) -> (Self, ConnectionHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);

        (
            Self {
                config,
                outbound: outbound_rx,
                status: status_tx,
                failures: 0,
            },
            ConnectionHandle {
                outbound: outbound_tx,
                status: status_rx,
            },
        )
    }

    /// Run the connection until the consumer goes away. Decoded text frames
    /// are pushed to `inbound` in arrival order; keepalive sentinels are
    /// filtered here, before any parsing.
    pub async fn run(mut self, inbound: mpsc::Sender<String>) {
        loop {
            match self.session(&inbound).await {
                Ok(()) => {
                    info!(channel = self.config.label, "consumer closed, stopping connection");
                    self.status.send_replace(ConnectionState::Disconnected);
                    return;
                }
                Err(e) => {
                    self.status.send_replace(ConnectionState::Disconnected);
                    self.failures += 1;
                    let delay = backoff_delay(
                        self.config.backoff_base,
                        self.config.backoff_max,
                        self.failures,
                    );
                    warn!(
                        channel = self.config.label,
                        error = %e,
                        attempt = self.failures,
                        delay_ms = delay.as_millis() as u64,
                        "reconnecting after connection loss"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// One connection lifetime: connect, subscribe, pump frames until the
    /// transport fails or goes stale. Ok(()) means the consumer is gone and
    /// supervision should stop; any Err triggers a reconnect.
    async fn session(&mut self, inbound: &mpsc::Sender<String>) -> Result<()> {
        self.status.send_replace(ConnectionState::Connecting);
        info!(channel = self.config.label, url = %self.config.url, "connecting");

        let (mut writer, mut reader) = client::connect(&self.config.url).await?;

        self.status.send_replace(ConnectionState::Connected);
        self.failures = 0;
        info!(channel = self.config.label, "connected, subscribing");

        writer.send_text(&self.config.subscribe_payload).await?;

        let mut keepalive = interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    writer.send_text(KEEPALIVE_PING).await?;
                }
                queued = self.outbound.recv() => match queued {
                    Some(payload) => writer.send_text(&payload).await?,
                    // Every handle dropped: nothing can use this channel again
                    None => {
                        writer.close().await;
                        return Ok(());
                    }
                },
                frame = timeout(self.config.stale_after, reader.next()) => match frame {
                    Err(_) => {
                        warn!(
                            channel = self.config.label,
                            stale_after_secs = self.config.stale_after.as_secs(),
                            "no inbound traffic, forcing reconnect"
                        );
                        writer.close().await;
                        return Err(MarketDataError::ConnectionStale);
                    }
                    Ok(Err(e)) => return Err(e),
                    Ok(Ok(Inbound::Ping(payload))) => writer.pong(payload).await?,
                    Ok(Ok(Inbound::Control)) => {}
                    Ok(Ok(Inbound::Text(text))) => {
                        let trimmed = text.trim();
                        if trimmed == KEEPALIVE_PING || trimmed == KEEPALIVE_PONG {
                            continue;
                        }
                        if inbound.send(text).await.is_err() {
                            writer.close().await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Exponential backoff: base delay doubled per consecutive failure, capped
fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(max)
}
