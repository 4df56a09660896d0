//! WebSocket connection management for the push-update channels

mod client;
mod manager;

pub use client::{connect, Inbound, WsReader, WsWriter};
pub use manager::{ChannelConfig, ConnectionHandle, ConnectionManager, ConnectionState};
