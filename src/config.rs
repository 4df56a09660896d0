//! Configuration module for the stream core

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Market slug to resolve into instrument ids (e.g., "bitcoin-up-or-down-november-23-1am-et")
    pub market_slug: String,

    /// WebSocket endpoint base; "/market" and "/user" channels hang off it
    pub ws_endpoint: String,

    /// Gamma REST endpoint for event lookup
    pub gamma_endpoint: String,

    /// Server-side endpoint that hands out user-channel credentials.
    /// The account feed is skipped when unset.
    pub auth_endpoint: Option<String>,

    /// IPC socket path for publishing derived views
    pub ipc_socket_path: String,

    /// Number of ladder rows per side in the projected view
    pub book_depth: usize,

    /// Quiet window for coalescing ladder recomputations
    pub debounce_ms: u64,

    /// Candle bucket width in milliseconds
    pub candle_window_ms: i64,

    /// Number of candles retained per instrument
    pub candle_capacity: usize,

    /// Keepalive cadence on both channels
    pub ping_interval_secs: u64,

    /// Force a reconnect when no inbound traffic for this long
    pub stale_after_secs: u64,

    /// Reconnection backoff bounds
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,

    /// Two prices summing to within this of 1.0 are treated as a complementary pair
    pub pair_tolerance: Decimal,

    /// Largest accepted move between consecutive displayed trade prices
    pub price_jump_limit: Decimal,

    /// Health check server port
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            market_slug: env::var("MARKET_SLUG")
                .unwrap_or_else(|_| "bitcoin-up-or-down-november-23-1am-et".to_string()),
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| "wss://ws-subscriptions-clob.polymarket.com/ws".to_string()),
            gamma_endpoint: env::var("GAMMA_ENDPOINT")
                .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string()),
            auth_endpoint: env::var("AUTH_ENDPOINT").ok().filter(|s| !s.is_empty()),
            ipc_socket_path: env::var("IPC_SOCKET_PATH")
                .unwrap_or_else(|_| "/tmp/clob-market-data.sock".to_string()),
            book_depth: parse_env("BOOK_DEPTH", 5),
            debounce_ms: parse_env("DEBOUNCE_MS", 50),
            candle_window_ms: parse_env("CANDLE_WINDOW_MS", 1_000),
            candle_capacity: parse_env("CANDLE_CAPACITY", 10),
            ping_interval_secs: parse_env("PING_INTERVAL_SECS", 10),
            stale_after_secs: parse_env("STALE_AFTER_SECS", 30),
            reconnect_base_ms: parse_env("RECONNECT_BASE_MS", 1_000),
            reconnect_max_ms: parse_env("RECONNECT_MAX_MS", 30_000),
            pair_tolerance: parse_env("PAIR_TOLERANCE", Decimal::new(1, 1)),
            price_jump_limit: parse_env("PRICE_JUMP_LIMIT", Decimal::new(5, 1)),
            health_port: parse_env("HEALTH_PORT", 9090),
        })
    }

    /// Market channel URL
    pub fn market_url(&self) -> String {
        format!("{}/market", self.ws_endpoint)
    }

    /// User channel URL
    pub fn user_url(&self) -> String {
        format!("{}/user", self.ws_endpoint)
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market_slug: "bitcoin-up-or-down-november-23-1am-et".to_string(),
            ws_endpoint: "wss://ws-subscriptions-clob.polymarket.com/ws".to_string(),
            gamma_endpoint: "https://gamma-api.polymarket.com".to_string(),
            auth_endpoint: None,
            ipc_socket_path: "/tmp/clob-market-data.sock".to_string(),
            book_depth: 5,
            debounce_ms: 50,
            candle_window_ms: 1_000,
            candle_capacity: 10,
            ping_interval_secs: 10,
            stale_after_secs: 30,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
            pair_tolerance: Decimal::new(1, 1),
            price_jump_limit: Decimal::new(5, 1),
            health_port: 9090,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_bounds() {
        let config = Config::default();
        assert_eq!(config.reconnect_base_ms, 1_000);
        assert_eq!(config.reconnect_max_ms, 30_000);
    }

    #[test]
    fn channel_urls() {
        let config = Config::default();
        assert!(config.market_url().ends_with("/market"));
        assert!(config.user_url().ends_with("/user"));
    }
}
