//! Per-instrument price ladder
//!
//! Uses BTreeMap for sorted price level management; bids are keyed in
//! reverse so both sides iterate best-first.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{BookView, DisplayRow, Side};
use crate::messages::BookSnapshot;

/// Ladder keys are canonicalized to this precision
const PRICE_DECIMALS: u32 = 4;

/// Canonical form of a ladder price key
pub fn canonical_price(price: Decimal) -> Decimal {
    price.round_dp(PRICE_DECIMALS)
}

/// Depth at one price
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Level {
    pub size: Decimal,
    pub total: Decimal,
}

/// Both sides of one instrument's book plus the feed's quote hints.
/// Invariant: every stored level has positive size.
#[derive(Debug, Default)]
pub struct OrderLadder {
    bids: BTreeMap<Reverse<Decimal>, Level>,
    asks: BTreeMap<Decimal, Level>,
    best_bid: Option<Decimal>,
    best_ask: Option<Decimal>,
}

impl OrderLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one diff entry. A non-positive size deletes the level (no-op
    /// when absent); a positive size accumulates onto any existing depth at
    /// that price.
    ///
    /// Returns true if the ladder changed.
    pub fn apply_diff(&mut self, side: Side, price: Decimal, size: Decimal) -> bool {
        let price = canonical_price(price);

        if size <= Decimal::ZERO {
            return match side {
                Side::Bid => self.bids.remove(&Reverse(price)).is_some(),
                Side::Ask => self.asks.remove(&price).is_some(),
            };
        }

        let level = match side {
            Side::Bid => self.bids.entry(Reverse(price)).or_default(),
            Side::Ask => self.asks.entry(price).or_default(),
        };
        level.size += size;
        level.total += size * price;
        true
    }

    /// Rebuild the ladder wholesale from a snapshot. Quote hints are
    /// cleared; the projection falls back to ladder tops until the next
    /// diff carries fresh ones.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        self.best_bid = None;
        self.best_ask = None;

        for level in &snapshot.bids {
            if level.size > Decimal::ZERO {
                let price = canonical_price(level.price);
                self.bids.insert(
                    Reverse(price),
                    Level {
                        size: level.size,
                        total: level.size * price,
                    },
                );
            }
        }

        for level in &snapshot.asks {
            if level.size > Decimal::ZERO {
                let price = canonical_price(level.price);
                self.asks.insert(
                    price,
                    Level {
                        size: level.size,
                        total: level.size * price,
                    },
                );
            }
        }
    }

    /// Record explicit quote hints from the feed
    pub fn set_quotes(&mut self, best_bid: Decimal, best_ask: Decimal) -> bool {
        if self.best_bid == Some(best_bid) && self.best_ask == Some(best_ask) {
            return false;
        }
        self.best_bid = Some(best_bid);
        self.best_ask = Some(best_ask);
        true
    }

    /// Top of the reconstructed bid side
    pub fn top_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Top of the reconstructed ask side
    pub fn top_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Project the top `depth` rows of each side into an immutable view.
    /// Quote hints are preferred for last/spread; the reconstructed tops
    /// are the fallback.
    pub fn project(&self, depth: usize) -> BookView {
        let bids: Vec<DisplayRow> = self
            .bids
            .iter()
            .take(depth)
            .map(|(Reverse(price), level)| DisplayRow {
                price: *price,
                size: level.size,
                total: level.total,
            })
            .collect();

        let asks: Vec<DisplayRow> = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, level)| DisplayRow {
                price: *price,
                size: level.size,
                total: level.total,
            })
            .collect();

        let (best_bid, best_ask) = match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => (Some(bid), Some(ask)),
            _ => (
                bids.first().map(|row| row.price),
                asks.first().map(|row| row.price),
            ),
        };

        let (last, spread) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => (Some((bid + ask) / Decimal::TWO), Some(ask - bid)),
            _ => (None, None),
        };

        BookView {
            bids,
            asks,
            last,
            spread,
            best_bid,
            best_ask,
        }
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }
}
