// src/market_data/tick_bars.rs
use crate::domain::models::{TickBar, Trade, TradeSide};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use std::collections::VecDeque;
use tokio::sync::broadcast;

pub const DEFAULT_RESOLUTIONS: [u32; 4] = [500, 1000, 5000, 15000];
pub const DEFAULT_BAR_RETENTION: usize = 1000;

const COMPLETED_BAR_CHANNEL_CAPACITY: usize = 1024;

/// In-progress bar plus the retained sealed bars of one resolution
struct ResolutionState {
    current: TickBar,
    completed: VecDeque<TickBar>,
}

/// Builds fixed tick-count bars at several resolutions from one trade stream.
///
/// Every resolution sits behind its own lock, so trades arriving from
/// different adapters only contend per resolution. Sealed bars are kept in a
/// bounded ring per resolution and published on a broadcast channel.
pub struct TickBarAggregator {
    resolutions: Vec<(u32, Mutex<ResolutionState>)>,
    retention: usize,
    last_price: Mutex<Option<f64>>,
    open_interest: Mutex<f64>,
    completed_tx: broadcast::Sender<TickBar>,
}

impl TickBarAggregator {
    /// Create an aggregator for the given resolutions
    pub fn new(resolutions: &[u32], retention: usize) -> Self {
        let (completed_tx, _) = broadcast::channel(COMPLETED_BAR_CHANNEL_CAPACITY);
        let now = Utc::now();

        let mut states: Vec<(u32, Mutex<ResolutionState>)> = Vec::with_capacity(resolutions.len());
        for &resolution in resolutions {
            if resolution == 0 {
                log::warn!("Ignoring tick bar resolution 0");
                continue;
            }
            if states.iter().any(|(r, _)| *r == resolution) {
                continue;
            }
            states.push((
                resolution,
                Mutex::new(ResolutionState {
                    current: TickBar::new(resolution, now),
                    completed: VecDeque::with_capacity(retention.min(DEFAULT_BAR_RETENTION)),
                }),
            ));
        }

        Self {
            resolutions: states,
            retention: retention.max(1),
            last_price: Mutex::new(None),
            open_interest: Mutex::new(0.0),
            completed_tx,
        }
    }

    /// Subscribe to sealed bars of every resolution
    pub fn subscribe(&self) -> broadcast::Receiver<TickBar> {
        self.completed_tx.subscribe()
    }

    pub fn resolutions(&self) -> Vec<u32> {
        self.resolutions.iter().map(|(r, _)| *r).collect()
    }

    pub fn process_trade(&self, trade: &Trade) {
        let price = trade.price.to_f64().unwrap_or_default();
        let volume = trade.volume.to_f64().unwrap_or_default();

        // Held across every resolution so all bars see trades in one order
        let mut last_price = self.last_price.lock();
        let previous_price = last_price.replace(price);

        for (resolution, state) in &self.resolutions {
            let mut state = state.lock();
            Self::apply_trade(&mut state.current, trade.side, price, volume, previous_price);

            if state.current.tick_count >= *resolution {
                self.seal(*resolution, &mut state);
            }
        }
    }

    fn apply_trade(
        bar: &mut TickBar,
        side: TradeSide,
        price: f64,
        volume: f64,
        previous_price: Option<f64>,
    ) {
        bar.tick_count += 1;
        bar.volume += volume;

        match side {
            TradeSide::Sell => bar.ask_volume += volume,
            TradeSide::Buy => bar.bid_volume += volume,
        }

        if bar.tick_count == 1 {
            bar.open_price = price;
            bar.high_price = price;
            bar.low_price = price;

            if let Some(previous) = previous_price.filter(|p| *p > 0.0) {
                bar.price_impact = (price - previous).abs();
            }
        } else {
            bar.high_price = bar.high_price.max(price);
            bar.low_price = bar.low_price.min(price);
        }

        bar.close_price = price;
    }

    fn seal(&self, resolution: u32, state: &mut ResolutionState) {
        let now = Utc::now();
        let mut bar = std::mem::replace(&mut state.current, TickBar::new(resolution, now));

        // Only the dominant side receives its share of the current open interest
        let total_volume = bar.ask_volume + bar.bid_volume;
        if total_volume > 0.0 {
            let open_interest = *self.open_interest.lock();
            if bar.ask_volume > bar.bid_volume {
                bar.open_pos_ask_change = open_interest * (bar.ask_volume / total_volume);
            } else {
                bar.open_pos_bid_change = open_interest * (bar.bid_volume / total_volume);
            }
        }
        bar.completed_at = Some(now);

        state.completed.push_back(bar.clone());
        while state.completed.len() > self.retention {
            state.completed.pop_front();
        }

        // Sent while the resolution lock is held so subscribers see arrival order
        if self.completed_tx.send(bar).is_err() {
            log::debug!("No subscribers for completed {}-tick bar", resolution);
        }
    }

    /// Distribute an open interest change over every in-progress bar
    pub fn update_open_interest(&self, open_interest: f64) {
        let change = {
            let mut current = self.open_interest.lock();
            let change = open_interest - *current;
            *current = open_interest;
            change
        };

        for (_, state) in &self.resolutions {
            let mut state = state.lock();
            let bar = &mut state.current;
            if bar.volume <= 0.0 {
                continue;
            }

            if bar.ask_volume > bar.bid_volume {
                bar.open_pos_ask_change += change * (bar.ask_volume / bar.volume);
            } else {
                bar.open_pos_bid_change += change * (bar.bid_volume / bar.volume);
            }
        }
    }

    /// Most recent `count` sealed bars of `resolution`, oldest first
    pub fn get_completed_bars(&self, resolution: u32, count: usize) -> Vec<TickBar> {
        let Some((_, state)) = self.resolutions.iter().find(|(r, _)| *r == resolution) else {
            return Vec::new();
        };

        let state = state.lock();
        let skip = state.completed.len().saturating_sub(count);
        state.completed.iter().skip(skip).cloned().collect()
    }

    /// Snapshot of the bar currently forming at `resolution`
    pub fn current_bar(&self, resolution: u32) -> Option<TickBar> {
        self.resolutions
            .iter()
            .find(|(r, _)| *r == resolution)
            .map(|(_, state)| state.lock().current.clone())
    }
}

impl Default for TickBarAggregator {
    fn default() -> Self {
        Self::new(&DEFAULT_RESOLUTIONS, DEFAULT_BAR_RETENTION)
    }
}
