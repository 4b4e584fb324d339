//! etftrader: trend-following signals, position-sized backtests and a
//! two-phase parameter optimizer for exchange-traded funds.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], wiring in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
