//! Boundary decode for WebSocket payloads
//!
//! Raw frames are classified exactly once, here, into typed message kinds.
//! Keepalive sentinels are plain text, not JSON, and are filtered before any
//! parsing is attempted.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Literal keepalive token exchanged on both channels
pub const KEEPALIVE_PING: &str = "PING";
/// Server-side reply to the keepalive token
pub const KEEPALIVE_PONG: &str = "PONG";

/// Taker side of a price change or trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One entry of a diff message
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChange {
    pub asset_id: String,

    #[serde(deserialize_with = "de_decimal")]
    pub price: Decimal,

    #[serde(deserialize_with = "de_decimal")]
    pub size: Decimal,

    pub side: TradeSide,

    /// Order hash carried by the feed; unused beyond logging
    #[serde(default)]
    pub hash: Option<String>,

    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub best_bid: Option<Decimal>,

    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub best_ask: Option<Decimal>,
}

/// Incremental price-level update; all entries arrived in one network message
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeBatch {
    #[serde(default)]
    pub market: Option<String>,

    #[serde(rename = "timestamp", default, deserialize_with = "de_opt_millis")]
    pub timestamp_ms: Option<i64>,

    pub price_changes: Vec<PriceChange>,
}

/// A single trade print from the feed
#[derive(Debug, Clone, Deserialize)]
pub struct TradeTick {
    pub asset_id: String,

    #[serde(deserialize_with = "de_decimal")]
    pub price: Decimal,

    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub size: Option<Decimal>,

    pub side: TradeSide,

    #[serde(rename = "timestamp", deserialize_with = "de_millis")]
    pub timestamp_ms: i64,

    pub transaction_hash: String,

    #[serde(default)]
    pub market: Option<String>,
}

/// One side level of a full snapshot
#[derive(Debug, Clone)]
pub struct RawLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Full book snapshot; replaces the ladder wholesale
#[derive(Debug, Clone, Deserialize)]
pub struct BookSnapshot {
    #[serde(default)]
    pub asset_id: Option<String>,

    #[serde(deserialize_with = "de_levels")]
    pub bids: Vec<RawLevel>,

    #[serde(deserialize_with = "de_levels")]
    pub asks: Vec<RawLevel>,
}

/// Decoded market-channel message
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Snapshot(BookSnapshot),
    Diff(PriceChangeBatch),
    Trade(TradeTick),
    Keepalive,
    Unknown(String),
}

impl FeedMessage {
    /// Classify a raw market-channel frame
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let trimmed = raw.trim();
        if trimmed == KEEPALIVE_PING || trimmed == KEEPALIVE_PONG {
            return Ok(FeedMessage::Keepalive);
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;

        match value.get("event_type").and_then(|v| v.as_str()) {
            Some("price_change") => Ok(FeedMessage::Diff(serde_json::from_value(value)?)),
            Some("last_trade_price") => Ok(FeedMessage::Trade(serde_json::from_value(value)?)),
            Some("book") => Ok(FeedMessage::Snapshot(serde_json::from_value(value)?)),
            _ if value.get("price_changes").is_some() => {
                Ok(FeedMessage::Diff(serde_json::from_value(value)?))
            }
            _ if value.get("bids").is_some() && value.get("asks").is_some() => {
                Ok(FeedMessage::Snapshot(serde_json::from_value(value)?))
            }
            _ => Ok(FeedMessage::Unknown(value.to_string())),
        }
    }
}

/// Account balance update, normalized from the several shapes the user
/// channel emits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceUpdate {
    pub balance: Decimal,
}

/// Decoded user-channel message
#[derive(Debug, Clone)]
pub enum AccountMessage {
    Balance(BalanceUpdate),
    Keepalive,
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct RawBalanceMessage {
    #[serde(default, deserialize_with = "de_opt_decimal")]
    balance: Option<Decimal>,

    #[serde(default, deserialize_with = "de_opt_decimal")]
    available: Option<Decimal>,

    #[serde(default, deserialize_with = "de_opt_decimal")]
    usdc_balance: Option<Decimal>,

    #[serde(default)]
    balances: Option<Vec<RawAssetBalance>>,
}

#[derive(Debug, Deserialize)]
struct RawAssetBalance {
    #[serde(default)]
    asset: Option<String>,

    #[serde(default)]
    symbol: Option<String>,

    #[serde(default, deserialize_with = "de_opt_decimal")]
    amount: Option<Decimal>,
}

impl AccountMessage {
    /// Classify a raw user-channel frame
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let trimmed = raw.trim();
        if trimmed == KEEPALIVE_PING || trimmed == KEEPALIVE_PONG {
            return Ok(AccountMessage::Keepalive);
        }

        let msg: RawBalanceMessage = serde_json::from_str(trimmed)?;

        let balance = msg
            .balance
            .or(msg.available)
            .or(msg.usdc_balance)
            .or_else(|| {
                msg.balances.as_deref().and_then(|entries| {
                    entries
                        .iter()
                        .find(|b| is_usdc(b.asset.as_deref()) || is_usdc(b.symbol.as_deref()))
                        .and_then(|b| b.amount)
                })
            });

        match balance {
            Some(balance) => Ok(AccountMessage::Balance(BalanceUpdate { balance })),
            None => Ok(AccountMessage::Unknown(trimmed.to_string())),
        }
    }
}

fn is_usdc(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.eq_ignore_ascii_case("usdc"))
}

/// Subscribe payload for the market channel
pub fn market_subscription(asset_ids: &[String]) -> String {
    serde_json::json!({ "assets_ids": asset_ids, "type": "market" }).to_string()
}

/// Numeric wire fields arrive as strings or bare numbers depending on the
/// producer; accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Text(String),
    Int(i64),
    Float(f64),
}

impl RawNumber {
    fn into_decimal<E: de::Error>(self) -> Result<Decimal, E> {
        match self {
            RawNumber::Text(s) => Decimal::from_str(&s).map_err(de::Error::custom),
            RawNumber::Int(n) => Ok(Decimal::from(n)),
            RawNumber::Float(f) => {
                Decimal::from_f64(f).ok_or_else(|| de::Error::custom("non-finite number"))
            }
        }
    }

    fn into_millis<E: de::Error>(self) -> Result<i64, E> {
        match self {
            RawNumber::Text(s) => s.parse().map_err(de::Error::custom),
            RawNumber::Int(n) => Ok(n),
            RawNumber::Float(f) => Ok(f as i64),
        }
    }
}

fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    RawNumber::deserialize(deserializer)?.into_decimal()
}

fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawNumber>::deserialize(deserializer)? {
        Some(raw) => raw.into_decimal().map(Some),
        None => Ok(None),
    }
}

fn de_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    RawNumber::deserialize(deserializer)?.into_millis()
}

fn de_opt_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawNumber>::deserialize(deserializer)? {
        Some(raw) => raw.into_millis().map(Some),
        None => Ok(None),
    }
}

/// Custom deserializer for snapshot levels from arrays of string pairs
fn de_levels<'de, D>(deserializer: D) -> Result<Vec<RawLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(de::Error::custom("invalid price level format"));
            }
            Ok(RawLevel {
                price: Decimal::from_str(&pair[0]).map_err(de::Error::custom)?,
                size: Decimal::from_str(&pair[1]).map_err(de::Error::custom)?,
            })
        })
        .collect()
}
