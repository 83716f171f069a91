// src/domain/models.rs
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;

/// Feed Event Structures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// A single executed trade, normalized by the exchange adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub side: TradeSide,
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub volume: Decimal,
    pub order_count: u32,
}

/// Full book snapshot; each one replaces the previous wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }
}

/// Volume-based bar sealed after `resolution` trades.
#[derive(Debug, Clone, PartialEq)]
pub struct TickBar {
    pub resolution: u32,
    pub tick_count: u32,
    pub volume: f64,
    pub ask_volume: f64,
    pub bid_volume: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub formation_start: DateTime<Utc>,
    /// Set when the bar is sealed; freezes `formation_time`.
    pub completed_at: Option<DateTime<Utc>>,
    pub open_pos_ask_change: f64,
    pub open_pos_bid_change: f64,
    pub price_impact: f64,
}

impl TickBar {
    pub fn new(resolution: u32, formation_start: DateTime<Utc>) -> Self {
        Self {
            resolution,
            tick_count: 0,
            volume: 0.0,
            ask_volume: 0.0,
            bid_volume: 0.0,
            open_price: 0.0,
            high_price: 0.0,
            low_price: 0.0,
            close_price: 0.0,
            formation_start,
            completed_at: None,
            open_pos_ask_change: 0.0,
            open_pos_bid_change: 0.0,
            price_impact: 0.0,
        }
    }

    pub fn delta(&self) -> f64 {
        self.bid_volume - self.ask_volume
    }

    pub fn delta_percentage(&self) -> f64 {
        if self.volume > 0.0 {
            self.delta() / self.volume
        } else {
            0.0
        }
    }

    pub fn price_range(&self) -> f64 {
        self.high_price - self.low_price
    }

    pub fn mid_price(&self) -> f64 {
        (self.high_price + self.low_price) / 2.0
    }

    /// Ask-side minus bid-side open position change.
    pub fn open_pos_imbalance(&self) -> f64 {
        self.open_pos_ask_change - self.open_pos_bid_change
    }

    pub fn formation_time(&self) -> Duration {
        self.completed_at.unwrap_or_else(Utc::now) - self.formation_start
    }

    pub fn formation_secs(&self) -> f64 {
        self.formation_time().num_milliseconds() as f64 / 1000.0
    }

    pub fn is_sealed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Continuously overwritten snapshot of derived market metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketMetrics {
    pub open_interest: f64,
    pub open_interest_change: f64,
    pub funding_rate: f64,
    pub atr: f64,
    pub vwap: f64,
    pub timestamp: DateTime<Utc>,
}

/// Price Structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Support,
    Resistance,
    Accumulation,
    Distribution,
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ZoneType::Support => write!(f, "Support"),
            ZoneType::Resistance => write!(f, "Resistance"),
            ZoneType::Accumulation => write!(f, "Accumulation"),
            ZoneType::Distribution => write!(f, "Distribution"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationZone {
    pub price_level: f64,
    pub volume_accumulated: f64,
    pub duration: Duration,
    pub open_pos_imbalance: f64,
    pub zone_type: ZoneType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub touch_count: usize,
    /// 0..=100
    pub strength_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutType {
    Bullish,
    Bearish,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutGrade {
    Moderate,
    Strong,
    Explosive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutInfo {
    pub breakout_type: BreakoutType,
    pub grade: BreakoutGrade,
    /// 0..=1
    pub strength: f64,
    pub volume_expansion: f64,
    pub price_extension: f64,
    pub is_confirmed: bool,
}

impl Default for BreakoutInfo {
    fn default() -> Self {
        Self {
            breakout_type: BreakoutType::False,
            grade: BreakoutGrade::Moderate,
            strength: 0.0,
            volume_expansion: 0.0,
            price_extension: 0.0,
            is_confirmed: false,
        }
    }
}

/// Signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalType {
    BearishBreakthrough,
    BullishBreakthrough,
    ExtremeImbalance,
    FastBreakthrough,
    WhaleActivity,
    Accumulation,
    Distribution,
    TrueBreakout,
    FalseBreakout,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SignalType::BearishBreakthrough => "BearishBreakthrough",
            SignalType::BullishBreakthrough => "BullishBreakthrough",
            SignalType::ExtremeImbalance => "ExtremeImbalance",
            SignalType::FastBreakthrough => "FastBreakthrough",
            SignalType::WhaleActivity => "WhaleActivity",
            SignalType::Accumulation => "Accumulation",
            SignalType::Distribution => "Distribution",
            SignalType::TrueBreakout => "TrueBreakout",
            SignalType::FalseBreakout => "FalseBreakout",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalStrength {
    Critical,
    Strong,
    Moderate,
    Weak,
}

impl SignalStrength {
    /// Maps a 0..100 score onto the four strength buckets.
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            SignalStrength::Critical
        } else if score > 50.0 {
            SignalStrength::Strong
        } else if score > 30.0 {
            SignalStrength::Moderate
        } else {
            SignalStrength::Weak
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignalStrength::Critical => write!(f, "CRITICAL"),
            SignalStrength::Strong => write!(f, "STRONG"),
            SignalStrength::Moderate => write!(f, "MODERATE"),
            SignalStrength::Weak => write!(f, "WEAK"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImbalanceSignal {
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub description: String,
    pub metrics: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    /// 0..=1
    pub confidence_level: f64,
}
