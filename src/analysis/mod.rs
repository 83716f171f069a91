// src/analysis/mod.rs
pub mod analyzer;
pub mod indicators;
pub mod patterns;

pub use analyzer::{AnalyzerConfig, Baselines, MarketAnalyzer};
pub use patterns::{count_touches, merge_overlapping_zones, ZoneDetector};
