//! Technical indicators feeding the signal rules.
//!
//! Every value at index `t` is computed only from bars `0..=t`.
//! - `sma`: rolling means (close and volume)
//! - `rsi`: exponentially smoothed relative strength index
//! - `IndicatorFrame`: the per-bar bundle consumed by the rule engine

pub mod rsi;
pub mod sma;

use crate::domain::ohlcv::PriceBar;
use crate::domain::params::StrategyParameters;

/// Per-bar derived values for one parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub short_ma: Vec<f64>,
    pub long_ma: Vec<f64>,
    pub volume_ma: Vec<f64>,
    pub rsi: Vec<Option<f64>>,
    /// `short_ma >= long_ma`
    pub ma_state: Vec<bool>,
    /// (long_ma - short_ma) / long_ma
    pub divergence_ratio: Vec<f64>,
}

impl IndicatorFrame {
    pub fn compute(bars: &[PriceBar], params: &StrategyParameters) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

        let short_ma = sma::rolling_mean(&closes, params.short_window());
        let long_ma = sma::rolling_mean(&closes, params.long_window());
        let volume_ma = sma::rolling_mean(&volumes, params.volume_window());
        let rsi = rsi::calculate_rsi(&closes, params.rsi_period());

        let ma_state = short_ma
            .iter()
            .zip(&long_ma)
            .map(|(s, l)| s >= l)
            .collect();
        let divergence_ratio = short_ma
            .iter()
            .zip(&long_ma)
            .map(|(s, l)| divergence(*s, *l))
            .collect();

        IndicatorFrame {
            short_ma,
            long_ma,
            volume_ma,
            rsi,
            ma_state,
            divergence_ratio,
        }
    }

    pub fn len(&self) -> usize {
        self.short_ma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.short_ma.is_empty()
    }

    /// 0 -> 1 transition of the MA state at `i`.
    pub fn cross_up(&self, i: usize) -> bool {
        i > 0 && self.ma_state[i] && !self.ma_state[i - 1]
    }

    /// 1 -> 0 transition of the MA state at `i`.
    pub fn cross_down(&self, i: usize) -> bool {
        i > 0 && !self.ma_state[i] && self.ma_state[i - 1]
    }
}

pub fn divergence(short_ma: f64, long_ma: f64) -> f64 {
    if long_ma == 0.0 {
        0.0
    } else {
        (long_ma - short_ma) / long_ma
    }
}
