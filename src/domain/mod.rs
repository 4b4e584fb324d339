//! Core domain types and logic.

pub mod ohlcv;
pub mod params;
pub mod indicator;
pub mod signal;
pub mod backtest;
pub mod metrics;
pub mod optimizer;
pub mod config_validation;
pub mod error;
