// src/signals/mod.rs
pub mod detector;

pub use detector::{ImbalanceConfig, ImbalanceDetector};
