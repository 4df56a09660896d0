//! Trade-tick aggregation with at-least-once delivery handling

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::{Candle, CandleSeries};
use crate::messages::{TradeSide, TradeTick};

/// Per-instrument aggregation state
#[derive(Debug)]
struct InstrumentState {
    /// Transaction hashes already folded in; retransmits are dropped
    seen_hashes: HashSet<String>,
    series: CandleSeries,
    /// Last trade price, unguarded; feeds gap-fill
    last_price: Option<Decimal>,
    /// Jump-guarded price for live display
    live_price: Option<Decimal>,
}

impl InstrumentState {
    fn new(capacity: usize) -> Self {
        Self {
            seen_hashes: HashSet::new(),
            series: CandleSeries::new(capacity),
            last_price: None,
            live_price: None,
        }
    }
}

/// Read-only view of one instrument's candle state, for publishing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleSnapshot {
    pub asset_id: String,
    pub candles: Vec<Candle>,
    pub latest_price: Option<Decimal>,
}

/// Turns BUY trade ticks into bounded per-instrument candle series
pub struct CandleAggregator {
    window_ms: i64,
    capacity: usize,
    jump_limit: Decimal,
    instruments: HashMap<String, InstrumentState>,
}

impl CandleAggregator {
    pub fn new(window_ms: i64, capacity: usize, jump_limit: Decimal) -> Self {
        Self {
            window_ms,
            capacity,
            jump_limit,
            instruments: HashMap::new(),
        }
    }

    /// Pre-create state for an instrument so its series exists from
    /// subscription time
    pub fn track(&mut self, asset_id: &str) {
        self.instruments
            .entry(asset_id.to_string())
            .or_insert_with(|| InstrumentState::new(self.capacity));
    }

    /// Fold a batch of ticks that arrived in one processing pass.
    ///
    /// Non-BUY ticks are skipped by policy, duplicates (same transaction
    /// hash) are dropped, and the remainder is merged in chronological
    /// order so the first price in a window opens it and the last closes
    /// it.
    ///
    /// Returns true if any series changed.
    pub fn apply_ticks(&mut self, ticks: &[TradeTick]) -> bool {
        let mut accepted: Vec<&TradeTick> = Vec::with_capacity(ticks.len());

        for tick in ticks {
            if tick.side != TradeSide::Buy {
                continue;
            }
            let state = self
                .instruments
                .entry(tick.asset_id.clone())
                .or_insert_with(|| InstrumentState::new(self.capacity));
            if !state.seen_hashes.insert(tick.transaction_hash.clone()) {
                debug!(
                    asset = %tick.asset_id,
                    hash = %tick.transaction_hash,
                    "duplicate trade tick dropped"
                );
                continue;
            }
            accepted.push(tick);
        }

        if accepted.is_empty() {
            return false;
        }
        accepted.sort_by_key(|tick| tick.timestamp_ms);

        for tick in accepted {
            let window = window_start(tick.timestamp_ms, self.window_ms);
            let Some(state) = self.instruments.get_mut(&tick.asset_id) else {
                continue;
            };
            state.series.record_trade(window, tick.price);
            state.last_price = Some(tick.price);

            match state.live_price {
                Some(previous) if (tick.price - previous).abs() > self.jump_limit => {
                    warn!(
                        asset = %tick.asset_id,
                        previous = %previous,
                        price = %tick.price,
                        "rejecting trade price jump beyond limit"
                    );
                }
                _ => state.live_price = Some(tick.price),
            }
        }

        true
    }

    /// Convenience for the single-tick path
    pub fn apply_tick(&mut self, tick: &TradeTick) -> bool {
        self.apply_ticks(std::slice::from_ref(tick))
    }

    /// Synthesize a flat candle for the window containing `now_ms` on every
    /// instrument that has traded but is silent in that window.
    ///
    /// Returns true if any series changed.
    pub fn fill_gaps(&mut self, now_ms: i64) -> bool {
        let window = window_start(now_ms, self.window_ms);
        let mut changed = false;

        for state in self.instruments.values_mut() {
            let Some(price) = state.last_price else {
                continue;
            };
            if !state.series.contains_window(window) {
                state.series.record_flat(window, price);
                changed = true;
            }
        }

        changed
    }

    pub fn series(&self, asset_id: &str) -> Option<&CandleSeries> {
        self.instruments.get(asset_id).map(|state| &state.series)
    }

    /// Most recent BUY price that passed the jump guard
    pub fn latest_price(&self, asset_id: &str) -> Option<Decimal> {
        self.instruments
            .get(asset_id)
            .and_then(|state| state.live_price)
    }

    /// Per-instrument snapshots for publishing, ordered by instrument id
    /// for determinism
    pub fn snapshots(&self) -> Vec<CandleSnapshot> {
        let mut snapshots: Vec<CandleSnapshot> = self
            .instruments
            .iter()
            .map(|(asset_id, state)| CandleSnapshot {
                asset_id: asset_id.clone(),
                candles: state.series.candles(),
                latest_price: state.live_price,
            })
            .collect();
        snapshots.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        snapshots
    }
}

/// Start of the fixed window containing `timestamp_ms`
fn window_start(timestamp_ms: i64, window_ms: i64) -> i64 {
    timestamp_ms - timestamp_ms.rem_euclid(window_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ASSET: &str = "7746";

    fn aggregator() -> CandleAggregator {
        CandleAggregator::new(1_000, 10, dec!(0.5))
    }

    fn tick(hash: &str, timestamp_ms: i64, price: Decimal, side: TradeSide) -> TradeTick {
        TradeTick {
            asset_id: ASSET.to_string(),
            price,
            size: Some(dec!(1)),
            side,
            timestamp_ms,
            transaction_hash: hash.to_string(),
            market: None,
        }
    }

    #[test]
    fn ticks_in_one_window_fold_into_one_candle() {
        let mut agg = aggregator();
        agg.apply_ticks(&[
            tick("a", 1_000, dec!(0.50), TradeSide::Buy),
            tick("b", 1_450, dec!(0.52), TradeSide::Buy),
            tick("c", 1_900, dec!(0.49), TradeSide::Buy),
        ]);

        let series = agg.series(ASSET).unwrap();
        assert_eq!(series.len(), 1);
        let candle = series.get(1_000).unwrap();
        assert_eq!(candle.open, dec!(0.50));
        assert_eq!(candle.high, dec!(0.52));
        assert_eq!(candle.low, dec!(0.49));
        assert_eq!(candle.close, dec!(0.49));
        assert_eq!(candle.volume, 3);
    }

    #[test]
    fn out_of_order_batch_is_merged_chronologically() {
        let mut agg = aggregator();
        agg.apply_ticks(&[
            tick("b", 1_450, dec!(0.52), TradeSide::Buy),
            tick("c", 1_900, dec!(0.49), TradeSide::Buy),
            tick("a", 1_000, dec!(0.50), TradeSide::Buy),
        ]);

        let candle = *agg.series(ASSET).unwrap().get(1_000).unwrap();
        assert_eq!(candle.open, dec!(0.50));
        assert_eq!(candle.close, dec!(0.49));
    }

    #[test]
    fn duplicate_hashes_are_idempotent() {
        let mut agg = aggregator();
        let first = tick("a", 1_000, dec!(0.50), TradeSide::Buy);
        agg.apply_tick(&first);
        agg.apply_tick(&first);

        let candle = *agg.series(ASSET).unwrap().get(1_000).unwrap();
        assert_eq!(candle.volume, 1);
    }

    #[test]
    fn sell_ticks_are_skipped_by_policy() {
        let mut agg = aggregator();
        assert!(!agg.apply_tick(&tick("a", 1_000, dec!(0.50), TradeSide::Sell)));
        assert!(agg.series(ASSET).is_none());
    }

    #[test]
    fn open_survives_later_ticks_in_the_window() {
        let mut agg = aggregator();
        agg.apply_tick(&tick("a", 2_000, dec!(0.40), TradeSide::Buy));
        agg.apply_tick(&tick("b", 2_500, dec!(0.60), TradeSide::Buy));

        let candle = *agg.series(ASSET).unwrap().get(2_000).unwrap();
        assert_eq!(candle.open, dec!(0.40));
        assert_eq!(candle.high, dec!(0.60));
        assert_eq!(candle.close, dec!(0.60));
    }

    #[test]
    fn silent_windows_get_flat_candles() {
        let mut agg = aggregator();
        agg.apply_tick(&tick("a", 5_000, dec!(0.50), TradeSide::Buy));

        assert!(agg.fill_gaps(6_000));
        assert!(agg.fill_gaps(7_500));
        assert!(agg.fill_gaps(8_999));

        let series = agg.series(ASSET).unwrap();
        for window in [6_000, 7_000, 8_000] {
            let candle = series.get(window).unwrap();
            assert_eq!(candle.open, dec!(0.50));
            assert_eq!(candle.high, dec!(0.50));
            assert_eq!(candle.low, dec!(0.50));
            assert_eq!(candle.close, dec!(0.50));
            assert_eq!(candle.volume, 0);
        }
    }

    #[test]
    fn gap_fill_is_a_noop_for_traded_windows_and_fresh_instruments() {
        let mut agg = aggregator();
        // Nothing traded yet: no last price, nothing to synthesize
        assert!(!agg.fill_gaps(1_500));

        agg.apply_tick(&tick("a", 1_000, dec!(0.50), TradeSide::Buy));
        assert!(!agg.fill_gaps(1_500));
    }

    #[test]
    fn series_is_bounded_by_capacity() {
        let mut agg = CandleAggregator::new(1_000, 3, dec!(0.5));
        for i in 0..5i64 {
            let hash = format!("h{i}");
            agg.apply_tick(&tick(&hash, i * 1_000, dec!(0.50), TradeSide::Buy));
        }
        let series = agg.series(ASSET).unwrap();
        assert_eq!(series.len(), 3);
        assert!(!series.contains_window(0));
        assert!(!series.contains_window(1_000));
        assert!(series.contains_window(4_000));
    }

    #[test]
    fn ohlc_invariant_holds_across_updates() {
        let mut agg = aggregator();
        let prices = [dec!(0.50), dec!(0.52), dec!(0.47), dec!(0.51)];
        for (i, price) in prices.iter().enumerate() {
            let hash = format!("h{i}");
            agg.apply_tick(&tick(&hash, 1_000 + i as i64 * 100, *price, TradeSide::Buy));
        }
        agg.fill_gaps(3_000);

        for candle in agg.series(ASSET).unwrap().candles() {
            assert!(candle.low <= candle.open.min(candle.close));
            assert!(candle.high >= candle.open.max(candle.close));
        }
    }

    #[test]
    fn price_jumps_beyond_the_limit_are_rejected_for_display() {
        let mut agg = aggregator();
        agg.apply_tick(&tick("a", 1_000, dec!(0.50), TradeSide::Buy));
        agg.apply_tick(&tick("b", 2_000, dec!(1.20), TradeSide::Buy));

        // The displayed price keeps the last accepted value
        assert_eq!(agg.latest_price(ASSET), Some(dec!(0.50)));
        // The candle still recorded the print; the guard is display-only
        assert_eq!(agg.series(ASSET).unwrap().get(2_000).unwrap().close, dec!(1.20));

        agg.apply_tick(&tick("c", 3_000, dec!(0.55), TradeSide::Buy));
        assert_eq!(agg.latest_price(ASSET), Some(dec!(0.55)));
    }

    #[test]
    fn tracked_instruments_start_with_an_empty_series() {
        let mut agg = aggregator();
        agg.track(ASSET);
        assert!(agg.series(ASSET).unwrap().is_empty());
        assert_eq!(agg.latest_price(ASSET), None);
    }
}
