//! Buy/sell/hold rule engine.
//!
//! Buy when any of:
//! - MA cross-up and volume >= volume_ma * volume_surge_multiplier
//! - RSI < rsi_oversold and volume > volume_ma * rsi_surge_multiplier
//! - short MA below long MA and divergence ratio > divergence_threshold
//!
//! Sell when Buy is false and any of:
//! - (MA cross-down or close < long MA) and close < short MA
//! - short MA at/above long MA and volume > volume_ma * volume_sell_multiplier
//!
//! The first `short_window` bars are always Hold.

use chrono::NaiveDate;
use std::fmt;

use super::error::TraderError;
use super::indicator::IndicatorFrame;
use super::ohlcv::{validate_series, PriceBar};
use super::params::StrategyParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Signal {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Signal {
    /// 1 for Buy, -1 for Sell, 0 for Hold.
    pub fn as_i8(self) -> i8 {
        match self {
            Signal::Buy => 1,
            Signal::Sell => -1,
            Signal::Hold => 0,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Condition flags behind one bar's signal.
#[derive(Debug, Clone, PartialEq)]
pub struct BarConditions {
    pub date: NaiveDate,
    pub ma_state: bool,
    pub cross_up: bool,
    pub cross_down: bool,
    pub divergence_ratio: f64,
    pub rsi: Option<f64>,
    pub ma_buy: bool,
    pub rsi_buy: bool,
    pub divergence_buy: bool,
    pub buy: bool,
    pub sell: bool,
}

#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    pub frame: IndicatorFrame,
    pub conditions: Vec<BarConditions>,
    pub signals: Vec<Signal>,
}

/// Compute indicators, condition flags and signals for every bar.
pub fn evaluate_rules(
    bars: &[PriceBar],
    params: &StrategyParameters,
) -> Result<RuleEvaluation, TraderError> {
    validate_series(bars, params.longest_window())?;

    let frame = IndicatorFrame::compute(bars, params);
    let mut conditions = Vec::with_capacity(bars.len());
    let mut signals = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let cond = bar_conditions(bar, i, &frame, params);
        let signal = if i < params.short_window() {
            Signal::Hold
        } else if cond.buy {
            Signal::Buy
        } else if cond.sell {
            Signal::Sell
        } else {
            Signal::Hold
        };
        conditions.push(cond);
        signals.push(signal);
    }

    Ok(RuleEvaluation {
        frame,
        conditions,
        signals,
    })
}

pub fn generate_signals(
    bars: &[PriceBar],
    params: &StrategyParameters,
) -> Result<Vec<Signal>, TraderError> {
    evaluate_rules(bars, params).map(|eval| eval.signals)
}

fn bar_conditions(
    bar: &PriceBar,
    i: usize,
    frame: &IndicatorFrame,
    params: &StrategyParameters,
) -> BarConditions {
    let volume = bar.volume as f64;
    let volume_ma = frame.volume_ma[i];
    let short_ma = frame.short_ma[i];
    let long_ma = frame.long_ma[i];
    let ma_state = frame.ma_state[i];
    let cross_up = frame.cross_up(i);
    let cross_down = frame.cross_down(i);
    let divergence_ratio = frame.divergence_ratio[i];
    let rsi = frame.rsi[i];

    let ma_buy = cross_up && volume >= volume_ma * params.volume_surge_multiplier();
    let rsi_buy = rsi.is_some_and(|r| r < params.rsi_oversold())
        && volume > volume_ma * params.rsi_surge_multiplier();
    let divergence_buy = !ma_state && divergence_ratio > params.divergence_threshold();
    let buy = ma_buy || rsi_buy || divergence_buy;

    let trend_break = (cross_down || bar.close < long_ma) && bar.close < short_ma;
    let volume_climax = ma_state && volume > volume_ma * params.volume_sell_multiplier();
    let sell = trend_break || volume_climax;

    BarConditions {
        date: bar.date,
        ma_state,
        cross_up,
        cross_down,
        divergence_ratio,
        rsi,
        ma_buy,
        rsi_buy,
        divergence_buy,
        buy,
        sell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::ParameterFields;

    fn make_bars(closes: &[f64], volumes: &[u64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: v,
                turnover_rate: None,
            })
            .collect()
    }

    fn params(fields: ParameterFields) -> StrategyParameters {
        StrategyParameters::new(fields).unwrap()
    }

    fn small_params() -> StrategyParameters {
        params(ParameterFields {
            short_window: 2,
            long_window: 4,
            volume_window: 3,
            rsi_period: 3,
            ..ParameterFields::default()
        })
    }

    #[test]
    fn signal_codes() {
        assert_eq!(Signal::Buy.as_i8(), 1);
        assert_eq!(Signal::Sell.as_i8(), -1);
        assert_eq!(Signal::Hold.as_i8(), 0);
        assert_eq!(Signal::default(), Signal::Hold);
    }

    #[test]
    fn rejects_series_shorter_than_longest_window() {
        let bars = make_bars(&[10.0, 11.0, 12.0], &[100, 100, 100]);
        let err = generate_signals(&bars, &small_params()).unwrap_err();
        assert!(matches!(
            err,
            TraderError::InsufficientData {
                bars: 3,
                minimum: 4
            }
        ));
    }

    #[test]
    fn flat_series_is_all_hold() {
        let bars = make_bars(&[10.0; 30], &[1000; 30]);
        let p = params(ParameterFields {
            short_window: 3,
            long_window: 10,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        assert!(eval.conditions.iter().all(|c| !c.cross_up && !c.cross_down));
        assert!(eval.signals.iter().all(|&s| s == Signal::Hold));
    }

    #[test]
    fn warmup_bars_are_hold_even_when_conditions_fire() {
        // Steady decline: close drops under both averages from the second bar.
        let closes: Vec<f64> = (0..12).map(|i| 20.0 - i as f64).collect();
        let bars = make_bars(&closes, &[1000; 12]);
        let p = params(ParameterFields {
            short_window: 3,
            long_window: 6,
            volume_window: 3,
            rsi_period: 3,
            divergence_threshold: 0.01,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        assert!(eval.conditions[1].sell);
        for s in &eval.signals[..3] {
            assert_eq!(*s, Signal::Hold);
        }
        assert!(eval.conditions[3].divergence_buy);
        assert_eq!(eval.signals[3], Signal::Buy);
    }

    #[test]
    fn crossover_with_volume_surge_buys() {
        let closes = [10.0, 10.0, 9.0, 8.0, 8.0, 12.0, 13.0];
        let volumes = [100, 100, 100, 100, 100, 400, 100];
        let bars = make_bars(&closes, &volumes);
        let p = params(ParameterFields {
            short_window: 1,
            long_window: 3,
            volume_window: 3,
            rsi_period: 3,
            divergence_threshold: 0.5,
            rsi_oversold: 1.0,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        assert!(eval.conditions[5].cross_up);
        assert!(eval.conditions[5].ma_buy);
        assert_eq!(eval.signals[5], Signal::Buy);
    }

    #[test]
    fn crossover_without_volume_does_not_buy() {
        let closes = [10.0, 10.0, 9.0, 8.0, 8.0, 12.0, 13.0];
        let bars = make_bars(&closes, &[100; 7]);
        let p = params(ParameterFields {
            short_window: 1,
            long_window: 3,
            volume_window: 3,
            rsi_period: 3,
            divergence_threshold: 0.5,
            rsi_oversold: 1.0,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        assert!(eval.conditions[5].cross_up);
        assert!(!eval.conditions[5].ma_buy);
        assert_ne!(eval.signals[5], Signal::Buy);
    }

    #[test]
    fn close_below_both_averages_sells() {
        let closes = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 9.0];
        let bars = make_bars(&closes, &[100; 7]);
        let p = params(ParameterFields {
            short_window: 2,
            long_window: 4,
            volume_window: 3,
            rsi_period: 3,
            divergence_threshold: 0.9,
            rsi_oversold: 1.0,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        assert!(eval.conditions[6].sell);
        assert_eq!(eval.signals[6], Signal::Sell);
    }

    #[test]
    fn volume_climax_in_uptrend_sells() {
        let closes = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0];
        let volumes = [100, 100, 100, 100, 100, 100, 5000];
        let bars = make_bars(&closes, &volumes);
        let p = params(ParameterFields {
            short_window: 2,
            long_window: 4,
            volume_window: 5,
            rsi_period: 3,
            volume_sell_multiplier: 2.0,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        assert!(eval.conditions[6].ma_state);
        assert_eq!(eval.signals[6], Signal::Sell);
    }

    #[test]
    fn buy_takes_precedence_over_sell() {
        // Decline: close under both averages (sell) and divergence over threshold (buy).
        let closes: Vec<f64> = (0..10).map(|i| 30.0 - 2.0 * i as f64).collect();
        let bars = make_bars(&closes, &[100; 10]);
        let p = params(ParameterFields {
            short_window: 2,
            long_window: 5,
            volume_window: 3,
            rsi_period: 3,
            divergence_threshold: 0.01,
            rsi_oversold: 1.0,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        let c = &eval.conditions[8];
        assert!(c.buy && c.sell);
        assert_eq!(eval.signals[8], Signal::Buy);
    }

    #[test]
    fn rsi_oversold_requires_volume() {
        let closes: Vec<f64> = (0..10).map(|i| 30.0 - i as f64).collect();
        let mut volumes = vec![100u64; 10];
        volumes[9] = 1000;
        let bars = make_bars(&closes, &volumes);
        let p = params(ParameterFields {
            short_window: 2,
            long_window: 5,
            volume_window: 3,
            rsi_period: 3,
            divergence_threshold: 0.9,
            rsi_oversold: 30.0,
            rsi_surge_multiplier: 1.5,
            ..ParameterFields::default()
        });
        let eval = evaluate_rules(&bars, &p).unwrap();
        assert!(!eval.conditions[8].rsi_buy);
        assert!(eval.conditions[9].rsi_buy);
        assert_eq!(eval.signals[9], Signal::Buy);
    }

    #[test]
    fn generate_signals_is_deterministic() {
        let closes: Vec<f64> = (0..40).map(|i| 10.0 + ((i * 7) % 11) as f64).collect();
        let volumes: Vec<u64> = (0..40).map(|i| 100 + ((i * 13) % 17) as u64 * 50).collect();
        let bars = make_bars(&closes, &volumes);
        let a = generate_signals(&bars, &small_params()).unwrap();
        let b = generate_signals(&bars, &small_params()).unwrap();
        assert_eq!(a, b);
    }
}
