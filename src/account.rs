//! Account (user-channel) feed
//!
//! Balance snapshots and deltas arrive on a separately authenticated
//! channel with the same connection-management pattern as the market feed.
//! Credentials come from a trusted server-side endpoint and are never
//! embedded client-side.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{MarketDataError, Result};
use crate::messages::AccountMessage;

/// User-channel credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    auth: Option<ApiCredentials>,
}

/// Current account state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountBalance {
    pub balance: Option<Decimal>,
    pub updated_at_ms: Option<i64>,
}

/// Fetch credentials from the trusted endpoint.
///
/// Missing or malformed auth material is a rejected result rather than a
/// retried one; no reconnect can fix configuration.
pub async fn fetch_credentials(auth_endpoint: &str) -> Result<ApiCredentials> {
    let response = reqwest::Client::new()
        .get(auth_endpoint)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| MarketDataError::Auth(e.to_string()))?;

    let body: AuthResponse = response
        .json()
        .await
        .map_err(|e| MarketDataError::Auth(e.to_string()))?;

    body.auth.ok_or_else(|| {
        MarketDataError::Auth("credentials endpoint returned no auth material".to_string())
    })
}

/// Subscribe payload for the user channel
pub fn subscribe_payload(credentials: &ApiCredentials) -> String {
    json!({ "markets": [], "type": "user", "auth": credentials }).to_string()
}

/// Consume decoded user-channel frames, maintaining the balance state
pub async fn run_consumer(
    mut inbound: mpsc::Receiver<String>,
    balance: &watch::Sender<AccountBalance>,
) {
    while let Some(raw) = inbound.recv().await {
        match AccountMessage::parse(&raw) {
            Ok(AccountMessage::Balance(update)) => {
                info!(balance = %update.balance, "account balance updated");
                balance.send_replace(AccountBalance {
                    balance: Some(update.balance),
                    updated_at_ms: Some(chrono::Utc::now().timestamp_millis()),
                });
            }
            Ok(AccountMessage::Keepalive) => {}
            Ok(AccountMessage::Unknown(msg)) => {
                debug!(msg = %msg, "unhandled user-channel message");
            }
            Err(e) => warn!(error = %e, "failed to parse user-channel message"),
        }
    }
}
