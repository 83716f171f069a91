// src/exchange/client.rs
use crate::domain::errors::ExchangeResult;
use crate::domain::models::{OrderBookSnapshot, Trade};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Normalized event delivered by an exchange adapter
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    Trade(Trade),
    OrderBook(OrderBookSnapshot),
    /// Total open interest as reported by this exchange
    OpenInterest(f64),
    FundingRate(f64),
}

/// Exchange adapter interface.
///
/// Adapters validate and normalize their feed before anything reaches the
/// sink handed over in [`ExchangeClient::connect`]; consumers assume every
/// event is canonical.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Stable exchange name, used to key per-exchange open interest
    fn name(&self) -> &str;

    /// Connect to the exchange; subsequent events go to `events`
    async fn connect(&mut self, events: mpsc::Sender<ExchangeEvent>) -> ExchangeResult<()>;

    /// Disconnect from the exchange and stop emitting events
    async fn disconnect(&mut self) -> ExchangeResult<()>;

    async fn subscribe_trades(&mut self, symbol: &str) -> ExchangeResult<()>;

    async fn subscribe_order_book(&mut self, symbol: &str) -> ExchangeResult<()>;

    /// Start the open interest polling loop for `symbol`
    async fn subscribe_open_interest(&mut self, symbol: &str) -> ExchangeResult<()>;
}

/// Subscription channels an adapter can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChannel {
    Trades,
    OrderBook,
    OpenInterest,
}

impl SubscriptionChannel {
    /// Channels the monitor subscribes to on every connected adapter
    pub const DEFAULT: [SubscriptionChannel; 3] = [
        SubscriptionChannel::Trades,
        SubscriptionChannel::OrderBook,
        SubscriptionChannel::OpenInterest,
    ];
}

/// Issue one subscription on an adapter
pub async fn subscribe<C: ExchangeClient + ?Sized>(
    client: &mut C,
    channel: SubscriptionChannel,
    symbol: &str,
) -> ExchangeResult<()> {
    match channel {
        SubscriptionChannel::Trades => client.subscribe_trades(symbol).await,
        SubscriptionChannel::OrderBook => client.subscribe_order_book(symbol).await,
        SubscriptionChannel::OpenInterest => client.subscribe_open_interest(symbol).await,
    }
}
