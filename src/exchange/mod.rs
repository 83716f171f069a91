// src/exchange/mod.rs
pub mod client;
pub mod simulated;

pub use client::{subscribe, ExchangeClient, ExchangeEvent, SubscriptionChannel};
pub use simulated::{SimulatedExchange, SimulatedFeedSettings};
