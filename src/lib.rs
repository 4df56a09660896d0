//! Stream-processing core for a binary-outcome CLOB market
//!
//! Connects to the push-update feed, reconstructs a depth ladder for the
//! primary instrument from incremental diffs, aggregates trade ticks into
//! fixed-window candles, and publishes bounded derived views.

use tokio::sync::{watch, Notify, RwLock};

pub mod account;
pub mod book;
pub mod candles;
pub mod config;
pub mod error;
pub mod messages;
pub mod publisher;
pub mod resolver;
pub mod websocket;

pub use account::AccountBalance;
pub use book::{BookView, OrderBookEngine, OrderLadder};
pub use candles::{Candle, CandleAggregator, CandleSeries, CandleSnapshot};
pub use config::Config;
pub use error::{MarketDataError, Result};
pub use messages::{AccountMessage, FeedMessage, TradeSide};
pub use publisher::Publisher;
pub use resolver::InstrumentSet;
pub use websocket::{ChannelConfig, ConnectionHandle, ConnectionManager, ConnectionState};

use std::sync::Arc;

/// Session-scoped service state shared across tasks.
///
/// Explicitly constructed and owned by the process; its lifetime is the
/// session, not the module. Mutable maps are only touched by their owning
/// consumer task; everything downstream reads immutable snapshots off the
/// watch channels.
pub struct AppState {
    pub book: RwLock<OrderBookEngine>,
    pub candles: RwLock<CandleAggregator>,
    pub instruments: InstrumentSet,
    pub publisher: Publisher,
    pub config: Arc<Config>,
    /// Signal that the ladder changed and a debounced reprojection is due
    pub book_dirty: Notify,
    pub book_view: watch::Sender<BookView>,
    pub candle_view: watch::Sender<Vec<CandleSnapshot>>,
    pub balance: watch::Sender<AccountBalance>,
}

impl AppState {
    pub fn new(config: Arc<Config>, instruments: InstrumentSet, publisher: Publisher) -> Arc<Self> {
        let book = OrderBookEngine::new(instruments.primary.clone(), config.pair_tolerance);

        let mut candles = CandleAggregator::new(
            config.candle_window_ms,
            config.candle_capacity,
            config.price_jump_limit,
        );
        for asset_id in &instruments.all {
            candles.track(asset_id);
        }

        Arc::new(Self {
            book: RwLock::new(book),
            candles: RwLock::new(candles),
            instruments,
            publisher,
            config,
            book_dirty: Notify::new(),
            book_view: watch::channel(BookView::default()).0,
            candle_view: watch::channel(Vec::new()).0,
            balance: watch::channel(AccountBalance::default()).0,
        })
    }
}
