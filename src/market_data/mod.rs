// src/market_data/mod.rs
pub mod processor;
pub mod tick_bars;

pub use processor::{MarketDataAggregator, MarketDataSettings};
pub use tick_bars::{TickBarAggregator, DEFAULT_BAR_RETENTION, DEFAULT_RESOLUTIONS};
