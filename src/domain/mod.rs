// src/domain/mod.rs
pub mod errors;
pub mod models;

// Re-export common types for convenience
pub use errors::{
    AppError, AppResult, ExchangeError, ExchangeResult, NotificationError, NotificationResult,
    PersistenceError, PersistenceResult,
};
pub use models::{
    AccumulationZone, BreakoutGrade, BreakoutInfo, BreakoutType, ImbalanceSignal, MarketMetrics,
    OrderBookLevel, OrderBookSnapshot, SignalStrength, SignalType, TickBar, Trade, TradeSide,
    ZoneType,
};
