// src/signals/detector.rs
use crate::analysis::Baselines;
use crate::domain::models::{ImbalanceSignal, SignalStrength, SignalType, TickBar};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Thresholds for the imbalance rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImbalanceConfig {
    pub bearish_multiplier: f64,
    pub bullish_multiplier: f64,
    pub delta_threshold: f64,
    pub volume_ratio: f64,
    pub fast_tick_threshold: u32,
    pub min_open_pos_change: f64,
    pub volume_multiplier: f64,
    pub min_price_movement: f64,
    pub extreme_imbalance_threshold: f64,
    pub extreme_delta_threshold: f64,
    pub extreme_ratio_threshold: f64,
    pub whale_tick_threshold: u32,
    pub whale_volume_threshold: f64,
    pub whale_imbalance_threshold: f64,
    pub whale_price_impact: f64,
    pub whale_time_threshold_secs: f64,
}

impl Default for ImbalanceConfig {
    fn default() -> Self {
        Self {
            bearish_multiplier: 2.5,
            bullish_multiplier: 2.5,
            delta_threshold: 0.6,
            volume_ratio: 1.8,
            fast_tick_threshold: 15,
            min_open_pos_change: 50.0,
            volume_multiplier: 2.0,
            min_price_movement: 0.5,
            extreme_imbalance_threshold: 100.0,
            extreme_delta_threshold: 0.75,
            extreme_ratio_threshold: 4.0,
            whale_tick_threshold: 8,
            whale_volume_threshold: 100.0,
            whale_imbalance_threshold: 75.0,
            whale_price_impact: 0.3,
            whale_time_threshold_secs: 30.0,
        }
    }
}

/// Stateless rule evaluator over completed bars.
///
/// Each bar is judged on its own; one bar may raise several signal types.
#[derive(Debug, Clone)]
pub struct ImbalanceDetector {
    config: Arc<ImbalanceConfig>,
}

impl ImbalanceDetector {
    pub fn new(config: Arc<ImbalanceConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImbalanceConfig {
        &self.config
    }

    pub fn detect_imbalances(
        &self,
        bars: &[TickBar],
        baselines: &Baselines,
    ) -> Vec<ImbalanceSignal> {
        let mut signals = Vec::new();

        for bar in bars {
            if self.check_bearish_breakthrough(bar, baselines) {
                signals.push(self.create_signal(SignalType::BearishBreakthrough, bar, baselines));
            }

            if self.check_bullish_breakthrough(bar, baselines) {
                signals.push(self.create_signal(SignalType::BullishBreakthrough, bar, baselines));
            }

            if self.check_extreme_imbalance(bar) {
                signals.push(self.create_signal(SignalType::ExtremeImbalance, bar, baselines));
            }

            if self.check_whale_activity(bar) {
                signals.push(self.create_signal(SignalType::WhaleActivity, bar, baselines));
            }
        }

        signals
    }

    pub fn check_bearish_breakthrough(&self, bar: &TickBar, baselines: &Baselines) -> bool {
        let cfg = &self.config;
        bar.open_pos_ask_change > bar.open_pos_bid_change * cfg.bearish_multiplier
            && bar.delta_percentage() < -cfg.delta_threshold
            && bar.ask_volume > bar.bid_volume * cfg.volume_ratio
            && bar.tick_count < cfg.fast_tick_threshold
            && bar.open_pos_ask_change > cfg.min_open_pos_change
            && bar.volume > baselines.avg_volume_10 * cfg.volume_multiplier
            && bar.price_range() > cfg.min_price_movement
    }

    pub fn check_bullish_breakthrough(&self, bar: &TickBar, baselines: &Baselines) -> bool {
        let cfg = &self.config;
        bar.open_pos_bid_change > bar.open_pos_ask_change * cfg.bullish_multiplier
            && bar.delta_percentage() > cfg.delta_threshold
            && bar.bid_volume > bar.ask_volume * cfg.volume_ratio
            && bar.tick_count < cfg.fast_tick_threshold
            && bar.open_pos_bid_change > cfg.min_open_pos_change
            && bar.volume > baselines.avg_volume_10 * cfg.volume_multiplier
            && bar.price_range() > cfg.min_price_movement
    }

    pub fn check_extreme_imbalance(&self, bar: &TickBar) -> bool {
        let cfg = &self.config;
        bar.open_pos_imbalance().abs() > cfg.extreme_imbalance_threshold
            || bar.delta_percentage().abs() > cfg.extreme_delta_threshold
            || volume_ratio(bar.ask_volume, bar.bid_volume) > cfg.extreme_ratio_threshold
            || volume_ratio(bar.bid_volume, bar.ask_volume) > cfg.extreme_ratio_threshold
    }

    pub fn check_whale_activity(&self, bar: &TickBar) -> bool {
        let cfg = &self.config;
        bar.tick_count <= cfg.whale_tick_threshold
            && bar.volume > cfg.whale_volume_threshold
            && bar.open_pos_imbalance().abs() > cfg.whale_imbalance_threshold
            && bar.price_impact > cfg.whale_price_impact
            && bar.formation_secs() < cfg.whale_time_threshold_secs
    }

    fn create_signal(
        &self,
        signal_type: SignalType,
        bar: &TickBar,
        baselines: &Baselines,
    ) -> ImbalanceSignal {
        ImbalanceSignal {
            signal_type,
            strength: calculate_strength(bar, baselines),
            description: format!(
                "{}: Vol={:.2}, Delta={:.2}%, OI_Imb={:.2}",
                signal_type,
                bar.volume,
                bar.delta_percentage() * 100.0,
                bar.open_pos_imbalance()
            ),
            metrics: extract_metrics(bar),
            timestamp: Utc::now(),
            confidence_level: calculate_confidence(bar, baselines),
        }
    }
}

/// `numerator / denominator`, infinite when only the denominator is empty
fn volume_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

fn calculate_strength(bar: &TickBar, baselines: &Baselines) -> SignalStrength {
    let mut score = 0.0;

    if bar.volume > baselines.avg_volume_20 * 3.0 {
        score += 30.0;
    }
    if bar.delta_percentage().abs() > 0.75 {
        score += 25.0;
    }
    if bar.formation_secs() < 10.0 {
        score += 20.0;
    }

    SignalStrength::from_score(score)
}

fn calculate_confidence(bar: &TickBar, baselines: &Baselines) -> f64 {
    let mut confidence: f64 = 0.5;

    if bar.volume > baselines.avg_volume_20 * 2.0 {
        confidence += 0.2;
    }
    if bar.delta_percentage().abs() > 0.7 {
        confidence += 0.15;
    }
    if baselines.atr > 0.0 && bar.price_range() > baselines.atr * 0.8 {
        confidence += 0.15;
    }

    confidence.min(1.0)
}

fn extract_metrics(bar: &TickBar) -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("Volume".to_string(), bar.volume),
        ("Delta".to_string(), bar.delta()),
        ("DeltaPercentage".to_string(), bar.delta_percentage()),
        ("OpenPosImbalance".to_string(), bar.open_pos_imbalance()),
        ("PriceImpact".to_string(), bar.price_impact),
        ("FormationSeconds".to_string(), bar.formation_secs()),
    ])
}
