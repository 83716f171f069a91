// src/analysis/patterns.rs
use crate::analysis::analyzer::{AnalyzerConfig, Baselines};
use crate::analysis::indicators::{
    mean, mean_mid_price, mid_price_deviation, open_pos_flow, total_delta, total_volume,
    window_span,
};
use crate::domain::models::{
    AccumulationZone, BreakoutGrade, BreakoutInfo, BreakoutType, TickBar, ZoneType,
};

// Zone strength weights, summing to 100
const VOLUME_WEIGHT: f64 = 30.0;
const DURATION_WEIGHT: f64 = 20.0;
const STABILITY_WEIGHT: f64 = 25.0;
const OPEN_POS_WEIGHT: f64 = 25.0;

/// Detects price-structure zones and grades breakouts from them
pub struct ZoneDetector<'a> {
    config: &'a AnalyzerConfig,
    baselines: Baselines,
}

impl<'a> ZoneDetector<'a> {
    pub fn new(config: &'a AnalyzerConfig, baselines: Baselines) -> Self {
        Self { config, baselines }
    }

    /// Slow, tight, high-volume windows of large bars with one-sided open position flow
    pub fn detect_large_bar_zones(&self, bars: &[TickBar]) -> Vec<AccumulationZone> {
        let cfg = self.config;
        let size = cfg.large_window;
        if size == 0 || bars.len() < size {
            return Vec::new();
        }

        let max_range = self.baselines.atr * cfg.accumulation_range_atr_ratio;

        bars.windows(size)
            .filter(|window| {
                window
                    .iter()
                    .all(|b| b.formation_secs() > cfg.accumulation_min_formation_secs)
                    && total_volume(window) > cfg.accumulation_min_volume
                    && window
                        .iter()
                        .map(TickBar::price_range)
                        .fold(f64::MIN, f64::max)
                        < max_range
                    && open_pos_flow(window).abs() > cfg.accumulation_min_open_pos_flow
            })
            .map(|window| {
                let first = &window[0];
                let last = &window[window.len() - 1];

                AccumulationZone {
                    price_level: mean_mid_price(window),
                    volume_accumulated: total_volume(window),
                    duration: last.formation_start - first.formation_start,
                    open_pos_imbalance: open_pos_flow(window),
                    zone_type: ZoneType::Accumulation,
                    start_time: first.formation_start,
                    end_time: Some(last.formation_start + last.formation_time()),
                    touch_count: 0,
                    strength_score: self.zone_strength(window),
                }
            })
            .collect()
    }

    /// Windows of medium bars whose mid prices cluster around one level
    pub fn detect_medium_bar_zones(&self, bars: &[TickBar]) -> Vec<AccumulationZone> {
        let cfg = self.config;
        let size = cfg.medium_window;
        if size == 0 || bars.len() < size {
            return Vec::new();
        }

        let mut zones = Vec::new();
        for window in bars.windows(size) {
            let level = mean_mid_price(window);
            let volume = total_volume(window);

            if mid_price_deviation(window, level) >= cfg.level_max_deviation
                || volume <= cfg.level_min_volume
            {
                continue;
            }

            let zone_type = if total_delta(window) > 0.0 {
                ZoneType::Support
            } else {
                ZoneType::Resistance
            };
            let first = &window[0];
            let last = &window[window.len() - 1];

            zones.push(AccumulationZone {
                price_level: level,
                volume_accumulated: volume,
                duration: last.formation_start - first.formation_start,
                open_pos_imbalance: open_pos_flow(window),
                zone_type,
                start_time: first.formation_start,
                end_time: None,
                touch_count: count_touches(level, bars, cfg.touch_tolerance),
                strength_score: self.zone_strength(window),
            });
        }

        zones
    }

    /// 0..100 score from relative volume, formation time, tightness and open position flow
    pub fn zone_strength(&self, window: &[TickBar]) -> f64 {
        let cfg = self.config;
        let mut score = 0.0;

        let avg_volume = self.baselines.avg_volume_20;
        if avg_volume > 0.0 {
            let window_volume = mean(window.iter().map(|b| b.volume)).unwrap_or(0.0);
            score += (window_volume / avg_volume * VOLUME_WEIGHT).min(VOLUME_WEIGHT);
        }

        let avg_formation = mean(window.iter().map(TickBar::formation_secs)).unwrap_or(0.0);
        if avg_formation > cfg.accumulation_min_formation_secs {
            score += DURATION_WEIGHT;
        }

        if window_span(window) < cfg.compact_span {
            score += STABILITY_WEIGHT;
        }

        if open_pos_flow(window).abs() > cfg.accumulation_min_open_pos_flow {
            score += OPEN_POS_WEIGHT;
        }

        score.min(100.0)
    }

    pub fn is_breakout(&self, current: &TickBar, zone: &AccumulationZone) -> bool {
        let cfg = self.config;

        let beyond_zone = current.close_price > zone.price_level + cfg.breakout_tolerance
            || current.close_price < zone.price_level - cfg.breakout_tolerance;
        let volume_expansion =
            current.volume > self.baselines.avg_volume_10 * cfg.breakout_volume_multiplier;
        let fast_formation = current.formation_secs() < cfg.breakout_max_formation_secs;

        beyond_zone && volume_expansion && fast_formation
    }

    /// Grade the move of the most recent bars away from `zone`
    pub fn analyze_breakout(&self, bars: &[TickBar], zone: &AccumulationZone) -> BreakoutInfo {
        let cfg = self.config;
        let recent = &bars[bars.len().saturating_sub(cfg.breakout_lookback)..];
        let mut info = BreakoutInfo::default();

        let Some(trigger) = recent.last() else {
            return info;
        };

        let level = zone.price_level;
        if trigger.close_price > level {
            info.breakout_type = BreakoutType::Bullish;
            info.price_extension = trigger.close_price - level;
        } else {
            info.breakout_type = BreakoutType::Bearish;
            info.price_extension = level - trigger.close_price;
        }

        let avg_volume = self.baselines.avg_volume_20;
        if avg_volume > 0.0 {
            info.volume_expansion = trigger.volume / avg_volume;
        }

        let delta_pct = trigger.delta_percentage().abs();
        if zone.volume_accumulated > 1000.0 && info.volume_expansion > 5.0 && delta_pct > 0.85 {
            info.grade = BreakoutGrade::Explosive;
            info.strength = 0.9;
        } else if zone.volume_accumulated > 500.0
            && info.volume_expansion > 3.0
            && delta_pct > 0.7
        {
            info.grade = BreakoutGrade::Strong;
            info.strength = 0.7;
        } else {
            info.grade = BreakoutGrade::Moderate;
            info.strength = 0.5;
        }

        let bullish = info.breakout_type == BreakoutType::Bullish;
        let confirmation = &recent[recent.len().saturating_sub(cfg.confirmation_bars)..];

        info.is_confirmed = confirmation.iter().all(|b| {
            if bullish {
                b.close_price > level
            } else {
                b.close_price < level
            }
        });

        if recent.len() >= cfg.confirmation_bars {
            let returned_to_zone = confirmation.iter().any(|b| {
                if bullish {
                    b.close_price < level
                } else {
                    b.close_price > level
                }
            });

            if returned_to_zone {
                info.breakout_type = BreakoutType::False;
                info.is_confirmed = false;
            }
        }

        info
    }
}

/// Bars whose range brackets `level` or whose high/low comes within `tolerance` of it
pub fn count_touches(level: f64, bars: &[TickBar], tolerance: f64) -> usize {
    bars.iter()
        .filter(|b| {
            (b.low_price <= level && b.high_price >= level)
                || (b.low_price - level).abs() < tolerance
                || (b.high_price - level).abs() < tolerance
        })
        .count()
}

/// Fold zones closer than `distance` into the first accepted zone, in price order
pub fn merge_overlapping_zones(
    mut zones: Vec<AccumulationZone>,
    distance: f64,
) -> Vec<AccumulationZone> {
    zones.sort_by(|a, b| a.price_level.total_cmp(&b.price_level));

    let mut merged: Vec<AccumulationZone> = Vec::with_capacity(zones.len());
    for zone in zones {
        match merged
            .iter_mut()
            .find(|existing| (existing.price_level - zone.price_level).abs() < distance)
        {
            Some(existing) => {
                existing.volume_accumulated += zone.volume_accumulated;
                existing.open_pos_imbalance += zone.open_pos_imbalance;
                existing.strength_score = existing.strength_score.max(zone.strength_score);
                existing.touch_count = existing.touch_count.max(zone.touch_count);
            }
            None => merged.push(zone),
        }
    }

    merged
}
