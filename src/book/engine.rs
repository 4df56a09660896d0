//! Primary-ladder reconstruction from complementary price changes
//!
//! A diff message for a binary market carries entries for both sides of the
//! pair. Two entries whose prices sum to ~1.0 describe the same economic
//! event; both are folded into the primary instrument's ladder, the
//! complementary one mirrored onto the opposite side.

use rust_decimal::Decimal;
use tracing::debug;

use super::{BookView, OrderLadder, Side};
use crate::messages::{BookSnapshot, PriceChange, PriceChangeBatch, TradeSide};

pub struct OrderBookEngine {
    primary_asset: String,
    ladder: OrderLadder,
    pair_tolerance: Decimal,
}

impl OrderBookEngine {
    pub fn new(primary_asset: String, pair_tolerance: Decimal) -> Self {
        Self {
            primary_asset,
            ladder: OrderLadder::new(),
            pair_tolerance,
        }
    }

    /// Apply a diff batch to the primary ladder.
    ///
    /// Each entry is paired with the first later entry whose price sums
    /// with its own to within the tolerance of 1.0. The lower-priced entry
    /// is the primary contribution and keys the level; the higher-priced
    /// entry is mirrored onto the opposite side at the same key. Entries
    /// without a partner are ignored.
    ///
    /// Returns true if the ladder changed.
    pub fn apply_batch(&mut self, batch: &PriceChangeBatch) -> bool {
        let changes = &batch.price_changes;
        let mut changed = false;
        let mut matched = vec![false; changes.len()];

        for i in 0..changes.len() {
            let Some(j) = self.find_partner(changes, i) else {
                continue;
            };
            matched[i] = true;
            matched[j] = true;

            let (primary, mirrored) = if changes[i].price <= changes[j].price {
                (&changes[i], &changes[j])
            } else {
                (&changes[j], &changes[i])
            };
            let price = primary.price;

            changed |= self
                .ladder
                .apply_diff(direct_side(primary.side), price, primary.size);
            changed |= self
                .ladder
                .apply_diff(mirror_side(mirrored.side), price, mirrored.size);

            if let (Some(bid), Some(ask)) = (primary.best_bid, primary.best_ask) {
                changed |= self.ladder.set_quotes(bid, ask);
            }
        }

        let unmatched = matched.iter().filter(|m| !**m).count();
        if unmatched > 0 {
            debug!(
                asset = %self.primary_asset,
                unmatched,
                total = changes.len(),
                "ignored price changes without a complementary partner"
            );
        }

        changed
    }

    fn find_partner(&self, changes: &[PriceChange], i: usize) -> Option<usize> {
        ((i + 1)..changes.len())
            .find(|&j| (changes[i].price + changes[j].price - Decimal::ONE).abs() < self.pair_tolerance)
    }

    /// Replace the primary ladder from a full snapshot. Snapshots naming a
    /// different instrument are ignored; mirrors are only derived from
    /// diffs.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) -> bool {
        if let Some(asset) = &snapshot.asset_id {
            if *asset != self.primary_asset {
                debug!(asset = %asset, "snapshot for undisplayed instrument ignored");
                return false;
            }
        }
        self.ladder.apply_snapshot(snapshot);
        true
    }

    pub fn project(&self, depth: usize) -> BookView {
        self.ladder.project(depth)
    }

    pub fn ladder(&self) -> &OrderLadder {
        &self.ladder
    }
}

/// Primary-instrument side mapping: a BUY adds bid depth, a SELL ask depth
fn direct_side(side: TradeSide) -> Side {
    match side {
        TradeSide::Buy => Side::Bid,
        TradeSide::Sell => Side::Ask,
    }
}

/// Complementary-instrument mapping: a BUY there sells the primary (ask),
/// a SELL there buys it (bid)
fn mirror_side(side: TradeSide) -> Side {
    match side {
        TradeSide::Buy => Side::Ask,
        TradeSide::Sell => Side::Bid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const PRIMARY: &str = "2153";
    const COMPLEMENTARY: &str = "1719";

    fn engine() -> OrderBookEngine {
        OrderBookEngine::new(PRIMARY.to_string(), dec!(0.1))
    }

    fn change(
        asset_id: &str,
        price: Decimal,
        size: Decimal,
        side: TradeSide,
    ) -> PriceChange {
        PriceChange {
            asset_id: asset_id.to_string(),
            price,
            size,
            side,
            hash: None,
            best_bid: None,
            best_ask: None,
        }
    }

    fn batch(changes: Vec<PriceChange>) -> PriceChangeBatch {
        PriceChangeBatch {
            market: None,
            timestamp_ms: Some(1_763_867_984_018),
            price_changes: changes,
        }
    }

    #[test]
    fn complementary_pair_applies_direct_and_mirrored_updates() {
        let mut engine = engine();
        let changed = engine.apply_batch(&batch(vec![
            change(PRIMARY, dec!(0.38), dec!(10), TradeSide::Buy),
            change(COMPLEMENTARY, dec!(0.62), dec!(10), TradeSide::Sell),
        ]));
        assert!(changed);

        // Direct BUY at 0.38 plus the mirror of the complementary SELL both
        // land on the bid side at 0.38
        let view = engine.project(5);
        assert_eq!(view.bids.len(), 1);
        assert_eq!(view.bids[0].price, dec!(0.38));
        assert_eq!(view.bids[0].size, dec!(20));
        assert!(view.asks.is_empty());
    }

    #[test]
    fn complementary_buy_mirrors_to_the_ask_side() {
        let mut engine = engine();
        engine.apply_batch(&batch(vec![
            change(COMPLEMENTARY, dec!(0.62), dec!(171.7), TradeSide::Sell),
            change(PRIMARY, dec!(0.38), dec!(171.7), TradeSide::Buy),
        ]));
        engine.apply_batch(&batch(vec![
            change(COMPLEMENTARY, dec!(0.58), dec!(99), TradeSide::Buy),
            change(PRIMARY, dec!(0.42), dec!(99), TradeSide::Sell),
        ]));

        let view = engine.project(5);
        // First batch: bid depth at 0.38 from both legs
        assert_eq!(view.bids[0].price, dec!(0.38));
        assert_eq!(view.bids[0].size, dec!(343.4));
        // Second batch: primary SELL plus mirrored complementary BUY at 0.42
        assert_eq!(view.asks[0].price, dec!(0.42));
        assert_eq!(view.asks[0].size, dec!(198));
    }

    #[test]
    fn entries_outside_tolerance_are_ignored() {
        let mut engine = engine();
        let changed = engine.apply_batch(&batch(vec![
            change(PRIMARY, dec!(0.38), dec!(10), TradeSide::Buy),
            change(COMPLEMENTARY, dec!(0.75), dec!(10), TradeSide::Sell),
        ]));
        assert!(!changed);
        assert_eq!(engine.ladder().bid_levels(), 0);
        assert_eq!(engine.ladder().ask_levels(), 0);
    }

    #[test]
    fn zero_size_leg_deletes_its_level() {
        let mut engine = engine();
        engine.apply_batch(&batch(vec![
            change(PRIMARY, dec!(0.38), dec!(10), TradeSide::Buy),
            change(COMPLEMENTARY, dec!(0.62), dec!(10), TradeSide::Sell),
        ]));
        // The primary leg deletes the bid level; the complementary BUY leg
        // opens ask depth at the same key
        let changed = engine.apply_batch(&batch(vec![
            change(PRIMARY, dec!(0.38), dec!(0), TradeSide::Buy),
            change(COMPLEMENTARY, dec!(0.62), dec!(5), TradeSide::Buy),
        ]));
        assert!(changed);

        let view = engine.project(5);
        assert!(view.bids.is_empty());
        assert_eq!(view.asks[0].price, dec!(0.38));
        assert_eq!(view.asks[0].size, dec!(5));
    }

    #[test]
    fn quote_hints_come_from_the_primary_leg() {
        let mut engine = engine();
        let mut primary = change(PRIMARY, dec!(0.38), dec!(10), TradeSide::Buy);
        primary.best_bid = Some(dec!(0.39));
        primary.best_ask = Some(dec!(0.41));
        let mut comp = change(COMPLEMENTARY, dec!(0.62), dec!(10), TradeSide::Sell);
        comp.best_bid = Some(dec!(0.59));
        comp.best_ask = Some(dec!(0.61));

        engine.apply_batch(&batch(vec![comp, primary]));

        let view = engine.project(5);
        assert_eq!(view.best_bid, Some(dec!(0.39)));
        assert_eq!(view.best_ask, Some(dec!(0.41)));
        assert_eq!(view.last, Some(dec!(0.40)));
        assert_eq!(view.spread, Some(dec!(0.02)));
    }

    #[test]
    fn snapshot_for_another_instrument_is_ignored() {
        use crate::messages::RawLevel;

        let mut engine = engine();
        let snap = BookSnapshot {
            asset_id: Some(COMPLEMENTARY.to_string()),
            bids: vec![RawLevel {
                price: dec!(0.6),
                size: dec!(1),
            }],
            asks: vec![],
        };
        assert!(!engine.apply_snapshot(&snap));

        let snap = BookSnapshot {
            asset_id: Some(PRIMARY.to_string()),
            bids: vec![RawLevel {
                price: dec!(0.4),
                size: dec!(1),
            }],
            asks: vec![],
        };
        assert!(engine.apply_snapshot(&snap));
        assert_eq!(engine.ladder().bid_levels(), 1);
    }
}
