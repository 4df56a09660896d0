//! Order book module
//!
//! Reconstructs a single displayed ladder for the primary instrument from
//! incremental diffs and full snapshots.

mod engine;
mod ladder;

pub use engine::OrderBookEngine;
pub use ladder::{canonical_price, Level, OrderLadder};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// One row of the projected ladder view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRow {
    pub price: Decimal,
    pub size: Decimal,
    pub total: Decimal,
}

/// Immutable top-of-book projection consumed by the presentation layer.
/// Recomputed wholesale on every qualifying update, never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookView {
    /// Top bids, highest price first
    pub bids: Vec<DisplayRow>,
    /// Top asks, lowest price first
    pub asks: Vec<DisplayRow>,
    /// Mid of the current quotes
    pub last: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}
