//! Performance and risk metrics over a completed ledger.

use serde::Serialize;

use super::backtest::{Ledger, PortfolioState};
use super::signal::Signal;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Return dispersion below this is rounding noise from summing equal returns.
const MIN_RETURN_STDDEV: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    /// Largest peak-to-trough decline, as a non-positive fraction.
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub num_days: usize,
}

impl PerformanceReport {
    pub fn compute(ledger: &Ledger) -> Self {
        Self::from_states(&ledger.states, ledger.initial_capital)
    }

    pub fn from_states(states: &[PortfolioState], initial_capital: f64) -> Self {
        let values: Vec<f64> = states.iter().map(|s| s.total_value).collect();
        let num_days = values.len();
        let final_value = values.last().copied().unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            final_value / initial_capital - 1.0
        } else {
            0.0
        };

        let annualized_return = if num_days > 0 && total_return > -1.0 {
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / num_days as f64) - 1.0
        } else if num_days > 0 {
            -1.0
        } else {
            0.0
        };

        let returns = super::backtest::daily_returns(&values);
        let (trade_count, win_rate) = trade_stats(states);

        PerformanceReport {
            initial_capital,
            final_value,
            total_return,
            annualized_return,
            max_drawdown: max_drawdown(&values),
            sharpe_ratio: sharpe_ratio(&returns),
            trade_count,
            win_rate,
            num_days,
        }
    }
}

/// min over t of (v[t] - running_peak[t]) / running_peak[t].
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            worst = worst.min((v - peak) / peak);
        }
    }
    worst
}

/// Annualised mean/stddev of daily returns (sample stddev, zero risk-free rate).
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();
    if stddev > MIN_RETURN_STDDEV {
        mean / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Pair each Buy opened while flat with the next executed Sell.
///
/// A partial sell closes the round trip; a win is an exit close above the
/// entry close. Returns (completed trades, win rate).
pub fn trade_stats(states: &[PortfolioState]) -> (usize, f64) {
    let mut trades = 0usize;
    let mut wins = 0usize;
    let mut entry: Option<f64> = None;

    for state in states {
        match (state.executed, entry) {
            (Signal::Buy, None) => entry = Some(state.close),
            (Signal::Sell, Some(price)) => {
                trades += 1;
                if state.close > price {
                    wins += 1;
                }
                entry = None;
            }
            _ => {}
        }
    }

    let win_rate = if trades > 0 {
        wins as f64 / trades as f64
    } else {
        0.0
    };
    (trades, win_rate)
}
