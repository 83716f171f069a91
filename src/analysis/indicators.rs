// src/analysis/indicators.rs
use crate::domain::models::TickBar;

/// Arithmetic mean, `None` for an empty input
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Mean volume of the last `periods` bars.
///
/// Falls back to every available bar when fewer than `periods` exist, and to
/// 0 when there are none.
pub fn average_volume<'a, I>(bars: I, periods: usize) -> f64
where
    I: IntoIterator<Item = &'a TickBar>,
    I::IntoIter: DoubleEndedIterator,
{
    mean(bars.into_iter().rev().take(periods).map(|b| b.volume)).unwrap_or(0.0)
}

/// Mean high-low range of the last `period` bars, 0 until `period` bars exist
pub fn average_range<'a, I>(bars: I, period: usize) -> f64
where
    I: IntoIterator<Item = &'a TickBar>,
    I::IntoIter: DoubleEndedIterator,
{
    if period == 0 {
        return 0.0;
    }

    let ranges: Vec<f64> = bars.into_iter().rev().take(period).map(TickBar::price_range).collect();
    if ranges.len() < period {
        0.0
    } else {
        mean(ranges).unwrap_or(0.0)
    }
}

pub fn total_volume(window: &[TickBar]) -> f64 {
    window.iter().map(|b| b.volume).sum()
}

pub fn total_delta(window: &[TickBar]) -> f64 {
    window.iter().map(TickBar::delta).sum()
}

/// Net open position flow, bid side minus ask side
pub fn open_pos_flow(window: &[TickBar]) -> f64 {
    window
        .iter()
        .map(|b| b.open_pos_bid_change - b.open_pos_ask_change)
        .sum()
}

pub fn mean_mid_price(window: &[TickBar]) -> f64 {
    mean(window.iter().map(TickBar::mid_price)).unwrap_or(0.0)
}

/// Mean absolute deviation of bar mid prices from `center`
pub fn mid_price_deviation(window: &[TickBar], center: f64) -> f64 {
    mean(window.iter().map(|b| (b.mid_price() - center).abs())).unwrap_or(0.0)
}

/// Highest high minus lowest low across the window
pub fn window_span(window: &[TickBar]) -> f64 {
    let high = window.iter().map(|b| b.high_price).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low_price).fold(f64::MAX, f64::min);
    if window.is_empty() {
        0.0
    } else {
        high - low
    }
}
