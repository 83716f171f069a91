// src/market_data/processor.rs
use crate::domain::models::{MarketMetrics, OrderBookSnapshot, TickBar, Trade};
use crate::market_data::tick_bars::TickBarAggregator;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;

pub const DEFAULT_TRADE_WINDOW: usize = 10_000;

/// Tuning for the derived metrics
#[derive(Debug, Clone)]
pub struct MarketDataSettings {
    /// Trades kept for VWAP
    pub trade_window: usize,
    /// Resolution whose sealed bars feed the ATR
    pub atr_resolution: u32,
    pub atr_period: usize,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            trade_window: DEFAULT_TRADE_WINDOW,
            atr_resolution: 1000,
            atr_period: 14,
        }
    }
}

/// Bounded trade window with exact running sums for VWAP
struct TradeWindow {
    trades: VecDeque<Trade>,
    capacity: usize,
    notional: Decimal,
    volume: Decimal,
}

impl TradeWindow {
    fn new(capacity: usize) -> Self {
        Self {
            trades: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            notional: Decimal::ZERO,
            volume: Decimal::ZERO,
        }
    }

    fn push(&mut self, trade: Trade) {
        self.notional += trade.price * trade.volume;
        self.volume += trade.volume;
        self.trades.push_back(trade);

        while self.trades.len() > self.capacity {
            if let Some(evicted) = self.trades.pop_front() {
                self.notional -= evicted.price * evicted.volume;
                self.volume -= evicted.volume;
            }
        }
    }

    fn vwap(&self) -> f64 {
        if self.trades.is_empty() || self.volume <= Decimal::ZERO {
            return 0.0;
        }
        (self.notional / self.volume).to_f64().unwrap_or_default()
    }
}

/// Single ingress point for normalized feed events.
///
/// Owns the trade window, the per-exchange open interest and the latest
/// order book, and delegates bar formation to its [`TickBarAggregator`].
pub struct MarketDataAggregator {
    bar_builder: TickBarAggregator,
    trade_window: Mutex<TradeWindow>,
    open_interest_by_exchange: Mutex<HashMap<String, f64>>,
    latest_order_book: RwLock<Option<OrderBookSnapshot>>,
    metrics: RwLock<MarketMetrics>,
    settings: MarketDataSettings,
}

impl MarketDataAggregator {
    pub fn new(bar_builder: TickBarAggregator, settings: MarketDataSettings) -> Self {
        Self {
            bar_builder,
            trade_window: Mutex::new(TradeWindow::new(settings.trade_window)),
            open_interest_by_exchange: Mutex::new(HashMap::new()),
            latest_order_book: RwLock::new(None),
            metrics: RwLock::new(MarketMetrics::default()),
            settings,
        }
    }

    pub fn process_trade(&self, trade: Trade) {
        self.trade_window.lock().push(trade.clone());
        self.bar_builder.process_trade(&trade);
        self.update_metrics();
    }

    pub fn update_order_book(&self, snapshot: OrderBookSnapshot) {
        *self.latest_order_book.write() = Some(snapshot);
        self.update_metrics();
    }

    /// Record one exchange's open interest and forward the cross-exchange mean
    pub fn update_open_interest(&self, open_interest: f64, exchange: &str) {
        let aggregate = {
            let mut by_exchange = self.open_interest_by_exchange.lock();
            by_exchange.insert(exchange.to_string(), open_interest);
            by_exchange.values().sum::<f64>() / by_exchange.len() as f64
        };

        {
            let mut metrics = self.metrics.write();
            metrics.open_interest_change = aggregate - metrics.open_interest;
            metrics.open_interest = aggregate;
            metrics.timestamp = Utc::now();
        }

        self.bar_builder.update_open_interest(aggregate);
    }

    pub fn update_funding_rate(&self, funding_rate: f64) {
        let mut metrics = self.metrics.write();
        metrics.funding_rate = funding_rate;
        metrics.timestamp = Utc::now();
    }

    pub fn current_metrics(&self) -> MarketMetrics {
        self.metrics.read().clone()
    }

    pub fn latest_order_book(&self) -> Option<OrderBookSnapshot> {
        self.latest_order_book.read().clone()
    }

    pub fn get_tick_bars(&self, resolution: u32, count: usize) -> Vec<TickBar> {
        self.bar_builder.get_completed_bars(resolution, count)
    }

    pub fn subscribe_bars(&self) -> broadcast::Receiver<TickBar> {
        self.bar_builder.subscribe()
    }

    pub fn bar_builder(&self) -> &TickBarAggregator {
        &self.bar_builder
    }

    // Holding the metrics write lock serializes concurrent recomputes
    fn update_metrics(&self) {
        let mut metrics = self.metrics.write();

        metrics.vwap = self.trade_window.lock().vwap();

        let period = self.settings.atr_period;
        let bars = self.bar_builder.get_completed_bars(self.settings.atr_resolution, period);
        if period > 0 && bars.len() >= period {
            metrics.atr = bars.iter().map(TickBar::price_range).sum::<f64>() / bars.len() as f64;
        }

        metrics.timestamp = Utc::now();
    }
}
