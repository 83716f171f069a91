// src/exchange/simulated.rs
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{OrderBookLevel, OrderBookSnapshot, Trade, TradeSide};
use crate::exchange::client::{ExchangeClient, ExchangeEvent};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const BOOK_DEPTH: usize = 10;

/// Shortest stream period; zero periods from config are raised to it
const MIN_STREAM_PERIOD: Duration = Duration::from_millis(1);

/// Parameters of the random-walk feed
#[derive(Debug, Clone)]
pub struct SimulatedFeedSettings {
    /// Fixed seed for a reproducible feed, entropy when `None`
    pub seed: Option<u64>,
    pub base_price: Decimal,
    /// Price step of one walk increment
    pub tick_size: Decimal,
    pub trades_per_second: u32,
    pub order_book_interval: Duration,
    pub open_interest_poll: Duration,
    pub base_open_interest: f64,
}

impl Default for SimulatedFeedSettings {
    fn default() -> Self {
        Self {
            seed: None,
            base_price: dec!(2000),
            tick_size: dec!(0.05),
            trades_per_second: 50,
            order_book_interval: Duration::from_millis(250),
            open_interest_poll: Duration::from_secs(5),
            base_open_interest: 250_000.0,
        }
    }
}

/// Exchange adapter backed by a seeded random walk.
///
/// Each subscription runs as its own task; trades and book snapshots share
/// the last traded price.
pub struct SimulatedExchange {
    name: String,
    settings: SimulatedFeedSettings,
    events: Option<mpsc::Sender<ExchangeEvent>>,
    last_price: Arc<Mutex<Decimal>>,
    tasks: Vec<JoinHandle<()>>,
    streams_started: u64,
}

impl SimulatedExchange {
    pub fn new(name: &str, settings: SimulatedFeedSettings) -> Self {
        let last_price = Arc::new(Mutex::new(settings.base_price));
        Self {
            name: name.to_string(),
            settings,
            events: None,
            last_price,
            tasks: Vec::new(),
            streams_started: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.events.is_some()
    }

    fn sender(&self, channel: &str) -> ExchangeResult<mpsc::Sender<ExchangeEvent>> {
        let events = self.events.clone().ok_or_else(|| {
            ExchangeError::Subscription(format!(
                "{}: cannot subscribe to {} while disconnected",
                self.name, channel
            ))
        })?;

        if events.is_closed() {
            return Err(ExchangeError::ChannelClosed(format!(
                "{}: {} sink dropped",
                self.name, channel
            )));
        }
        Ok(events)
    }

    /// Independent generator per stream, derived from the configured seed
    fn next_rng(&mut self) -> StdRng {
        self.streams_started += 1;
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.streams_started)),
            None => StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self, events: mpsc::Sender<ExchangeEvent>) -> ExchangeResult<()> {
        if events.is_closed() {
            return Err(ExchangeError::ChannelClosed(format!(
                "{}: event sink already closed",
                self.name
            )));
        }

        log::info!("{}: connected to simulated feed", self.name);
        self.events = Some(events);
        Ok(())
    }

    async fn disconnect(&mut self) -> ExchangeResult<()> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.events = None;
        log::info!("{}: disconnected", self.name);
        Ok(())
    }

    async fn subscribe_trades(&mut self, symbol: &str) -> ExchangeResult<()> {
        let tx = self.sender("trades")?;
        let mut rng = self.next_rng();
        let last_price = self.last_price.clone();
        let exchange = self.name.clone();
        let tick_size = self.settings.tick_size;
        let rate = self.settings.trades_per_second.max(1) as f64;
        let period = Duration::from_secs_f64(1.0 / rate).max(MIN_STREAM_PERIOD);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut sequence: u64 = 0;

            loop {
                interval.tick().await;
                sequence += 1;

                let price = {
                    let mut price = last_price.lock();
                    let step = Decimal::from(rng.gen_range(-2i64..=2)) * tick_size;
                    *price = (*price + step).max(tick_size);
                    *price
                };

                let trade = Trade {
                    id: format!("{}-{}", exchange, sequence),
                    price,
                    volume: Decimal::new(rng.gen_range(1..=500), 2),
                    side: if rng.gen_bool(0.5) { TradeSide::Buy } else { TradeSide::Sell },
                    timestamp: Utc::now(),
                    exchange: exchange.clone(),
                };

                if tx.send(ExchangeEvent::Trade(trade)).await.is_err() {
                    log::debug!("{}: trade sink closed", exchange);
                    break;
                }
            }
        });

        self.tasks.push(handle);
        log::info!("{}: subscribed to {} trades", self.name, symbol);
        Ok(())
    }

    async fn subscribe_order_book(&mut self, symbol: &str) -> ExchangeResult<()> {
        let tx = self.sender("order book")?;
        let mut rng = self.next_rng();
        let last_price = self.last_price.clone();
        let exchange = self.name.clone();
        let tick_size = self.settings.tick_size;
        let period = self.settings.order_book_interval.max(MIN_STREAM_PERIOD);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                let mid = *last_price.lock();
                let mut level = |distance: usize| OrderBookLevel {
                    price: mid + Decimal::from(distance as i64) * tick_size,
                    volume: Decimal::new(rng.gen_range(10..=5000), 2),
                    order_count: rng.gen_range(1..=20),
                };
                let asks: Vec<OrderBookLevel> = (1..=BOOK_DEPTH).map(&mut level).collect();
                let bids: Vec<OrderBookLevel> = (1..=BOOK_DEPTH)
                    .map(|d| {
                        let mut l = level(d);
                        l.price = (mid - Decimal::from(d as i64) * tick_size).max(tick_size);
                        l
                    })
                    .collect();

                let snapshot = OrderBookSnapshot {
                    bids,
                    asks,
                    timestamp: Utc::now(),
                };

                if tx.send(ExchangeEvent::OrderBook(snapshot)).await.is_err() {
                    log::debug!("{}: order book sink closed", exchange);
                    break;
                }
            }
        });

        self.tasks.push(handle);
        log::info!("{}: subscribed to {} order book", self.name, symbol);
        Ok(())
    }

    async fn subscribe_open_interest(&mut self, symbol: &str) -> ExchangeResult<()> {
        let tx = self.sender("open interest")?;
        let mut rng = self.next_rng();
        let exchange = self.name.clone();
        let period = self.settings.open_interest_poll.max(MIN_STREAM_PERIOD);
        let mut open_interest = self.settings.base_open_interest;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                // up to 0.5% drift per poll
                open_interest = (open_interest * (1.0 + rng.gen_range(-0.005..0.005))).max(0.0);
                let funding_rate = rng.gen_range(-0.0005..0.0005);

                let events = [
                    ExchangeEvent::OpenInterest(open_interest),
                    ExchangeEvent::FundingRate(funding_rate),
                ];
                for event in events {
                    if tx.send(event).await.is_err() {
                        log::debug!("{}: open interest sink closed", exchange);
                        return;
                    }
                }
            }
        });

        self.tasks.push(handle);
        log::info!("{}: polling {} open interest every {:?}", self.name, symbol, period);
        Ok(())
    }
}

impl Drop for SimulatedExchange {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(seed: u64) -> SimulatedFeedSettings {
        SimulatedFeedSettings {
            seed: Some(seed),
            trades_per_second: 1000,
            order_book_interval: Duration::from_millis(5),
            open_interest_poll: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn subscribing_requires_connection() {
        let mut exchange = SimulatedExchange::new("sim", settings(1));
        let result = exchange.subscribe_trades("ETHUSDT").await;
        assert!(matches!(result, Err(ExchangeError::Subscription(_))));
    }

    #[tokio::test]
    async fn closed_sink_is_reported() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut exchange = SimulatedExchange::new("sim", settings(1));
        let result = exchange.connect(tx).await;
        assert!(matches!(result, Err(ExchangeError::ChannelClosed(_))));
        assert!(!exchange.is_connected());

        let (tx, rx) = mpsc::channel(8);
        exchange.connect(tx).await.unwrap();
        drop(rx);
        let result = exchange.subscribe_order_book("ETHUSDT").await;
        assert!(matches!(result, Err(ExchangeError::ChannelClosed(_))));
    }

    #[tokio::test]
    async fn zero_periods_still_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut exchange = SimulatedExchange::new(
            "sim",
            SimulatedFeedSettings {
                seed: Some(2),
                order_book_interval: Duration::ZERO,
                open_interest_poll: Duration::ZERO,
                ..Default::default()
            },
        );
        exchange.connect(tx).await.unwrap();
        exchange.subscribe_open_interest("ETHUSDT").await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(matches!(first, Some(ExchangeEvent::OpenInterest(oi)) if oi > 0.0));
        exchange.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn emits_normalized_trades() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut exchange = SimulatedExchange::new("sim", settings(7));
        exchange.connect(tx).await.unwrap();
        exchange.subscribe_trades("ETHUSDT").await.unwrap();

        for _ in 0..20 {
            match rx.recv().await {
                Some(ExchangeEvent::Trade(trade)) => {
                    assert_eq!(trade.exchange, "sim");
                    assert!(trade.price > Decimal::ZERO);
                    assert!(trade.volume > Decimal::ZERO);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        exchange.disconnect().await.unwrap();
        assert!(!exchange.is_connected());
    }

    #[tokio::test]
    async fn order_book_brackets_last_price() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut exchange = SimulatedExchange::new("sim", settings(3));
        exchange.connect(tx).await.unwrap();
        exchange.subscribe_order_book("ETHUSDT").await.unwrap();

        match rx.recv().await {
            Some(ExchangeEvent::OrderBook(book)) => {
                assert_eq!(book.bids.len(), BOOK_DEPTH);
                assert_eq!(book.asks.len(), BOOK_DEPTH);
                let bid = book.best_bid().unwrap().price;
                let ask = book.best_ask().unwrap().price;
                assert!(bid < dec!(2000) && ask > dec!(2000));
            }
            other => panic!("unexpected event {:?}", other),
        }
        exchange.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn open_interest_poll_emits_oi_and_funding() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut exchange = SimulatedExchange::new("sim", settings(5));
        exchange.connect(tx).await.unwrap();
        exchange.subscribe_open_interest("ETHUSDT").await.unwrap();

        assert!(matches!(rx.recv().await, Some(ExchangeEvent::OpenInterest(oi)) if oi > 0.0));
        assert!(matches!(rx.recv().await, Some(ExchangeEvent::FundingRate(_))));
        exchange.disconnect().await.unwrap();
    }
}
