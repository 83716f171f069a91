// src/analysis/analyzer.rs
use crate::analysis::indicators::{average_range, average_volume};
use crate::analysis::patterns::{merge_overlapping_zones, ZoneDetector};
use crate::domain::models::{AccumulationZone, BreakoutInfo, TickBar};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Market analyzer configuration
///
/// Price tolerances are absolute price units and do not scale with the
/// instrument's price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Bars kept as the volume/ATR baseline
    pub history_capacity: usize,
    pub atr_period: usize,

    /// Resolutions at or above this are "large"
    pub large_resolution_min: u32,
    /// Resolutions in [min, max) are "medium"
    pub medium_resolution_min: u32,
    pub medium_resolution_max: u32,
    pub large_window: usize,
    pub medium_window: usize,

    pub accumulation_min_formation_secs: f64,
    pub accumulation_min_volume: f64,
    pub accumulation_range_atr_ratio: f64,
    pub accumulation_min_open_pos_flow: f64,

    /// Support/resistance: mean mid-price deviation must stay below this
    pub level_max_deviation: f64,
    pub level_min_volume: f64,
    pub touch_tolerance: f64,
    /// Window span below which a zone scores as stable
    pub compact_span: f64,
    pub merge_distance: f64,

    pub breakout_tolerance: f64,
    pub breakout_volume_multiplier: f64,
    pub breakout_max_formation_secs: f64,
    pub breakout_lookback: usize,
    pub confirmation_bars: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            atr_period: 14,
            large_resolution_min: 10_000,
            medium_resolution_min: 1_000,
            medium_resolution_max: 5_000,
            large_window: 5,
            medium_window: 10,
            accumulation_min_formation_secs: 30.0 * 60.0,
            accumulation_min_volume: 2000.0,
            accumulation_range_atr_ratio: 0.5,
            accumulation_min_open_pos_flow: 500.0,
            level_max_deviation: 2.0,
            level_min_volume: 500.0,
            touch_tolerance: 1.0,
            compact_span: 2.0,
            merge_distance: 3.0,
            breakout_tolerance: 2.0,
            breakout_volume_multiplier: 3.0,
            breakout_max_formation_secs: 3.0 * 60.0,
            breakout_lookback: 5,
            confirmation_bars: 3,
        }
    }
}

/// Baseline statistics over the analyzer's bar history
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Baselines {
    pub avg_volume_10: f64,
    pub avg_volume_20: f64,
    pub atr: f64,
}

/// Keeps the historical bar series and runs zone and breakout analysis on it
pub struct MarketAnalyzer {
    historical_bars: RwLock<VecDeque<TickBar>>,
    config: AnalyzerConfig,
}

impl MarketAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            historical_bars: RwLock::new(VecDeque::with_capacity(config.history_capacity)),
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn update_historical_bars(&self, bar: TickBar) {
        let mut history = self.historical_bars.write();
        history.push_back(bar);

        while history.len() > self.config.history_capacity {
            history.pop_front();
        }
    }

    pub fn history_len(&self) -> usize {
        self.historical_bars.read().len()
    }

    pub fn get_average_volume(&self, periods: usize) -> f64 {
        average_volume(self.historical_bars.read().iter(), periods)
    }

    pub fn get_atr(&self) -> f64 {
        average_range(self.historical_bars.read().iter(), self.config.atr_period)
    }

    /// All baselines from one consistent view of the history
    pub fn baselines(&self) -> Baselines {
        let history = self.historical_bars.read();
        Baselines {
            avg_volume_10: average_volume(history.iter(), 10),
            avg_volume_20: average_volume(history.iter(), 20),
            atr: average_range(history.iter(), self.config.atr_period),
        }
    }

    pub fn detect_accumulation_zones(&self, bars: &[TickBar]) -> Vec<AccumulationZone> {
        let cfg = &self.config;
        let detector = ZoneDetector::new(cfg, self.baselines());

        let large: Vec<TickBar> = bars
            .iter()
            .filter(|b| b.resolution >= cfg.large_resolution_min)
            .cloned()
            .collect();
        let medium: Vec<TickBar> = bars
            .iter()
            .filter(|b| {
                b.resolution >= cfg.medium_resolution_min
                    && b.resolution < cfg.medium_resolution_max
            })
            .cloned()
            .collect();

        let mut zones = detector.detect_large_bar_zones(&large);
        zones.extend(detector.detect_medium_bar_zones(&medium));

        merge_overlapping_zones(zones, cfg.merge_distance)
    }

    pub fn is_breakout(&self, current: &TickBar, zone: &AccumulationZone) -> bool {
        ZoneDetector::new(&self.config, self.baselines()).is_breakout(current, zone)
    }

    pub fn analyze_breakout(&self, bars: &[TickBar], zone: &AccumulationZone) -> BreakoutInfo {
        ZoneDetector::new(&self.config, self.baselines()).analyze_breakout(bars, zone)
    }
}

impl Default for MarketAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ZoneType;
    use chrono::{Duration, Utc};

    fn bar(resolution: u32, volume: f64, low: f64, high: f64, formation: Duration) -> TickBar {
        let start = Utc::now() - Duration::hours(2);
        let mut bar = TickBar::new(resolution, start);
        bar.tick_count = resolution;
        bar.volume = volume;
        bar.low_price = low;
        bar.high_price = high;
        bar.open_price = low;
        bar.close_price = high;
        bar.completed_at = Some(start + formation);
        bar
    }

    #[test]
    fn history_is_bounded() {
        let analyzer = MarketAnalyzer::new(AnalyzerConfig {
            history_capacity: 3,
            ..Default::default()
        });
        for v in 1..=5 {
            analyzer.update_historical_bars(bar(500, v as f64, 0.0, 1.0, Duration::seconds(1)));
        }

        assert_eq!(analyzer.history_len(), 3);
        assert_eq!(analyzer.get_average_volume(10), 4.0);
    }

    #[test]
    fn baselines_on_empty_history() {
        let analyzer = MarketAnalyzer::default();
        assert_eq!(analyzer.get_average_volume(10), 0.0);
        assert_eq!(analyzer.get_atr(), 0.0);
        assert_eq!(analyzer.baselines(), Baselines::default());
    }

    #[test]
    fn atr_needs_fourteen_bars() {
        let analyzer = MarketAnalyzer::default();
        for _ in 0..13 {
            analyzer.update_historical_bars(bar(1000, 10.0, 100.0, 103.0, Duration::seconds(5)));
        }
        assert_eq!(analyzer.get_atr(), 0.0);

        analyzer.update_historical_bars(bar(1000, 10.0, 100.0, 103.0, Duration::seconds(5)));
        assert_eq!(analyzer.get_atr(), 3.0);
    }

    #[test]
    fn medium_bars_form_support_zone() {
        let analyzer = MarketAnalyzer::default();
        for _ in 0..20 {
            analyzer.update_historical_bars(bar(1000, 60.0, 99.0, 101.0, Duration::seconds(30)));
        }

        let bars: Vec<TickBar> = (0..10)
            .map(|_| {
                let mut b = bar(1000, 60.0, 99.5, 100.5, Duration::seconds(30));
                b.bid_volume = 40.0;
                b.ask_volume = 20.0;
                b
            })
            .collect();

        let zones = analyzer.detect_accumulation_zones(&bars);
        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert_eq!(zone.zone_type, ZoneType::Support);
        assert_eq!(zone.price_level, 100.0);
        assert_eq!(zone.volume_accumulated, 600.0);
        assert_eq!(zone.touch_count, 10);
        // volume factor 30 plus a span under 2 units
        assert_eq!(zone.strength_score, 55.0);
    }

    #[test]
    fn large_bars_form_accumulation_zone() {
        let analyzer = MarketAnalyzer::default();
        for _ in 0..14 {
            analyzer.update_historical_bars(bar(15000, 500.0, 100.0, 104.0, Duration::minutes(40)));
        }

        let bars: Vec<TickBar> = (0..5)
            .map(|_| {
                let mut b = bar(15000, 500.0, 100.0, 101.0, Duration::minutes(45));
                b.open_pos_bid_change = 150.0;
                b
            })
            .collect();

        let zones = analyzer.detect_accumulation_zones(&bars);
        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert_eq!(zone.zone_type, ZoneType::Accumulation);
        assert_eq!(zone.price_level, 100.5);
        assert_eq!(zone.open_pos_imbalance, 750.0);
        assert_eq!(zone.strength_score, 100.0);
        assert!(zone.end_time.is_some());
    }

    #[test]
    fn resolutions_between_classes_produce_no_zones() {
        let analyzer = MarketAnalyzer::default();
        let bars: Vec<TickBar> = (0..20)
            .map(|_| bar(5000, 600.0, 99.5, 100.5, Duration::hours(1)))
            .collect();
        assert!(analyzer.detect_accumulation_zones(&bars).is_empty());
    }
}
