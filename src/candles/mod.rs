//! Candle aggregation module
//!
//! Buckets trade ticks into fixed time windows and keeps a bounded rolling
//! series per instrument, gap-filled during silent periods.

mod aggregator;

pub use aggregator::{CandleAggregator, CandleSnapshot};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One fixed-window OHLC bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub window_start_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Contributing tick count; 0 for synthesized flat candles
    pub volume: u32,
}

impl Candle {
    /// Window opened by its first trade
    pub fn opening(window_start_ms: i64, price: Decimal) -> Self {
        Self {
            window_start_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1,
        }
    }

    /// Synthesized candle for a window with no trades
    pub fn flat(window_start_ms: i64, price: Decimal) -> Self {
        Self {
            window_start_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
        }
    }

    /// Fold one more trade price into the window. `open` never changes
    /// after creation; the last price wins `close`.
    pub fn absorb(&mut self, price: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += 1;
    }
}

/// Bounded candle sequence ordered by window start, oldest first.
/// Inserting past capacity evicts the oldest window.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    windows: BTreeMap<i64, Candle>,
    capacity: usize,
}

impl CandleSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: BTreeMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains_window(&self, window_start_ms: i64) -> bool {
        self.windows.contains_key(&window_start_ms)
    }

    pub fn get(&self, window_start_ms: i64) -> Option<&Candle> {
        self.windows.get(&window_start_ms)
    }

    /// Fold a trade into its window, creating the candle if absent
    pub fn record_trade(&mut self, window_start_ms: i64, price: Decimal) {
        self.windows
            .entry(window_start_ms)
            .and_modify(|candle| candle.absorb(price))
            .or_insert_with(|| Candle::opening(window_start_ms, price));
        self.trim();
    }

    /// Insert a synthesized flat candle for a silent window
    pub fn record_flat(&mut self, window_start_ms: i64, price: Decimal) {
        self.windows
            .entry(window_start_ms)
            .or_insert_with(|| Candle::flat(window_start_ms, price));
        self.trim();
    }

    /// The retained candles, oldest to newest
    pub fn candles(&self) -> Vec<Candle> {
        self.windows.values().copied().collect()
    }

    fn trim(&mut self) {
        while self.windows.len() > self.capacity {
            self.windows.pop_first();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn series_evicts_oldest_past_capacity() {
        let mut series = CandleSeries::new(3);
        for window in [1_000, 2_000, 3_000, 4_000] {
            series.record_trade(window, dec!(0.5));
        }
        assert_eq!(series.len(), 3);
        assert!(!series.contains_window(1_000));
        assert!(series.contains_window(4_000));
    }

    #[test]
    fn candles_come_back_oldest_first() {
        let mut series = CandleSeries::new(10);
        series.record_trade(3_000, dec!(0.5));
        series.record_trade(1_000, dec!(0.4));
        series.record_flat(2_000, dec!(0.45));

        let starts: Vec<i64> = series.candles().iter().map(|c| c.window_start_ms).collect();
        assert_eq!(starts, vec![1_000, 2_000, 3_000]);
    }

    #[test]
    fn flat_insert_never_overwrites_a_traded_window() {
        let mut series = CandleSeries::new(10);
        series.record_trade(1_000, dec!(0.5));
        series.record_flat(1_000, dec!(0.9));

        let candle = series.get(1_000).unwrap();
        assert_eq!(candle.close, dec!(0.5));
        assert_eq!(candle.volume, 1);
    }
}
