//! Per-dimension search ranges for the parameter optimizer.
//!
//! Ranges come from a static table, a per-symbol cache, or are derived from
//! the instrument's daily-return volatility and MA divergence percentiles:
//!
//! | tier        | volatility      | long window | divergence clamp |
//! |-------------|-----------------|-------------|------------------|
//! | low         | < 0.005         | 10..=18     | 0.005..=0.020    |
//! | medium      | 0.005 .. 0.012  | 10..=18     | 0.010..=0.040    |
//! | high        | >= 0.012        | 10..=32     | 0.030..=0.080    |

use serde::{Deserialize, Serialize};

use crate::domain::error::TraderError;
use crate::domain::indicator::sma::rolling_mean_full;
use crate::domain::ohlcv::PriceBar;

/// Inclusive range of one search dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RangeSpec {
    Int { lo: i64, hi: i64 },
    /// Continuous range snapped to multiples of `step`.
    Float { lo: f64, hi: f64, step: f64 },
}

impl RangeSpec {
    pub fn int(lo: i64, hi: i64) -> Self {
        RangeSpec::Int { lo, hi }
    }

    pub fn float(lo: f64, hi: f64, step: f64) -> Self {
        RangeSpec::Float { lo, hi, step }
    }

    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            RangeSpec::Int { lo, hi } => (lo as f64, hi as f64),
            RangeSpec::Float { lo, hi, .. } => (lo, hi),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let (lo, hi) = self.bounds();
        value >= lo - 1e-9 && value <= hi + 1e-9
    }

    fn validate(&self, name: &str) -> Result<(), TraderError> {
        let invalid = |reason: String| {
            Err(TraderError::InvalidParameters {
                reason: format!("range {name}: {reason}"),
            })
        };
        match *self {
            RangeSpec::Int { lo, hi } => {
                if lo <= 0 || hi < lo {
                    return invalid(format!("expected 0 < lo <= hi, got {lo}..={hi}"));
                }
            }
            RangeSpec::Float { lo, hi, step } => {
                if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && hi >= lo) {
                    return invalid(format!("expected 0 < lo <= hi, got {lo}..={hi}"));
                }
                if !(step.is_finite() && step > 0.0) {
                    return invalid(format!("step must be positive, got {step}"));
                }
            }
        }
        Ok(())
    }
}

/// Decimal places implied by a grid step (0.01 -> 2, 0.02 -> 2, 0.001 -> 3).
pub fn step_decimals(step: f64) -> i32 {
    if step >= 1.0 {
        0
    } else {
        (-step.log10() - 1e-9).ceil() as i32
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub short_window: RangeSpec,
    pub long_window: RangeSpec,
    pub volume_window: RangeSpec,
    pub volume_surge_multiplier: RangeSpec,
    pub volume_sell_multiplier: RangeSpec,
    pub rsi_period: RangeSpec,
    pub rsi_oversold: RangeSpec,
    pub rsi_surge_multiplier: RangeSpec,
    pub divergence_threshold: RangeSpec,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        ParameterRanges::medium_volatility(0.010, 0.040)
    }
}

impl ParameterRanges {
    pub fn from_stats(stats: &SeriesStats) -> Self {
        let SeriesStats {
            volatility,
            divergence_q70: q70,
            divergence_q95: q95,
        } = *stats;

        if volatility < 0.005 {
            ParameterRanges {
                short_window: RangeSpec::int(2, 5),
                long_window: RangeSpec::int(10, 18),
                volume_window: RangeSpec::int(5, 9),
                volume_surge_multiplier: RangeSpec::float(0.90, 1.15, 0.01),
                volume_sell_multiplier: RangeSpec::int(3, 6),
                rsi_period: RangeSpec::int(10, 16),
                rsi_oversold: RangeSpec::int(27, 36),
                rsi_surge_multiplier: RangeSpec::float(1.00, 1.50, 0.02),
                divergence_threshold: RangeSpec::float(
                    q70.clamp(0.005, 0.020),
                    q95.clamp(0.005, 0.020),
                    0.001,
                ),
            }
        } else if volatility < 0.012 {
            ParameterRanges::medium_volatility(q70.clamp(0.010, 0.040), q95.clamp(0.010, 0.040))
        } else {
            ParameterRanges {
                short_window: RangeSpec::int(2, 5),
                long_window: RangeSpec::int(10, 32),
                volume_window: RangeSpec::int(7, 12),
                volume_surge_multiplier: RangeSpec::float(1.00, 1.20, 0.01),
                volume_sell_multiplier: RangeSpec::int(4, 8),
                rsi_period: RangeSpec::int(12, 20),
                rsi_oversold: RangeSpec::int(22, 32),
                rsi_surge_multiplier: RangeSpec::float(1.10, 1.80, 0.02),
                divergence_threshold: RangeSpec::float(
                    q70.clamp(0.030, 0.080),
                    q95.clamp(0.030, 0.080),
                    0.001,
                ),
            }
        }
    }

    fn medium_volatility(divergence_lo: f64, divergence_hi: f64) -> Self {
        ParameterRanges {
            short_window: RangeSpec::int(2, 5),
            long_window: RangeSpec::int(10, 18),
            volume_window: RangeSpec::int(6, 10),
            volume_surge_multiplier: RangeSpec::float(0.95, 1.18, 0.01),
            volume_sell_multiplier: RangeSpec::int(3, 7),
            rsi_period: RangeSpec::int(10, 18),
            rsi_oversold: RangeSpec::int(25, 35),
            rsi_surge_multiplier: RangeSpec::float(1.00, 1.60, 0.02),
            divergence_threshold: RangeSpec::float(divergence_lo, divergence_hi, 0.001),
        }
    }

    pub fn named(&self) -> [(&'static str, &RangeSpec); 9] {
        [
            ("short_window", &self.short_window),
            ("long_window", &self.long_window),
            ("volume_window", &self.volume_window),
            ("volume_surge_multiplier", &self.volume_surge_multiplier),
            ("volume_sell_multiplier", &self.volume_sell_multiplier),
            ("rsi_period", &self.rsi_period),
            ("rsi_oversold", &self.rsi_oversold),
            ("rsi_surge_multiplier", &self.rsi_surge_multiplier),
            ("divergence_threshold", &self.divergence_threshold),
        ]
    }

    pub fn validate(&self) -> Result<(), TraderError> {
        for (name, spec) in self.named() {
            spec.validate(name)?;
        }
        let window_dims = [
            ("short_window", &self.short_window),
            ("long_window", &self.long_window),
            ("volume_window", &self.volume_window),
            ("rsi_period", &self.rsi_period),
        ];
        for (name, spec) in window_dims {
            if !matches!(spec, RangeSpec::Int { .. }) {
                return Err(TraderError::InvalidParameters {
                    reason: format!("range {name} must be an integer range"),
                });
            }
        }
        Ok(())
    }
}

/// Statistics used to pick a volatility tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    /// Sample standard deviation of daily close-to-close returns.
    pub volatility: f64,
    pub divergence_q70: f64,
    pub divergence_q95: f64,
}

impl SeriesStats {
    /// Divergence percentiles use full-window 5/20-bar close averages, with
    /// negative ratios clipped to zero.
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();

        let short = rolling_mean_full(&closes, 5);
        let long = rolling_mean_full(&closes, 20);
        let mut ratios: Vec<f64> = short
            .iter()
            .zip(&long)
            .filter_map(|(s, l)| match (s, l) {
                (Some(s), Some(l)) if *l != 0.0 => Some(((l - s) / l).max(0.0)),
                _ => None,
            })
            .filter(|r| r.is_finite())
            .collect();
        ratios.sort_by(f64::total_cmp);

        let (divergence_q70, divergence_q95) = if ratios.is_empty() {
            (0.005, 0.02)
        } else {
            (percentile(&ratios, 70.0), percentile(&ratios, 95.0))
        };

        SeriesStats {
            volatility: sample_std(&returns),
            divergence_q70,
            divergence_q95,
        }
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

/// Linear-interpolated percentile of an ascending, non-empty slice.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn bars_from(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000,
                turnover_rate: None,
            })
            .collect()
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&v, 50.0), 3.0, epsilon = 1e-12);
        assert_relative_eq!(percentile(&v, 70.0), 3.8, epsilon = 1e-12);
        assert_relative_eq!(percentile(&v, 95.0), 4.8, epsilon = 1e-12);
        assert_relative_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn step_decimals_from_grid() {
        assert_eq!(step_decimals(0.01), 2);
        assert_eq!(step_decimals(0.02), 2);
        assert_eq!(step_decimals(0.001), 3);
        assert_eq!(step_decimals(1.0), 0);
        assert_relative_eq!(round_to(1.23456, 2), 1.23);
    }

    #[test]
    fn flat_series_falls_back_to_default_quantiles() {
        let stats = SeriesStats::from_bars(&bars_from(&[10.0; 10]));
        assert_eq!(stats.volatility, 0.0);
        assert_relative_eq!(stats.divergence_q70, 0.005);
        assert_relative_eq!(stats.divergence_q95, 0.02);
    }

    #[test]
    fn flat_long_series_has_zero_divergence() {
        let stats = SeriesStats::from_bars(&bars_from(&[10.0; 40]));
        assert_eq!(stats.divergence_q70, 0.0);
        assert_eq!(stats.divergence_q95, 0.0);
    }

    #[test]
    fn low_volatility_tier() {
        let ranges = ParameterRanges::from_stats(&SeriesStats {
            volatility: 0.001,
            divergence_q70: 0.0,
            divergence_q95: 0.5,
        });
        assert_eq!(ranges.long_window, RangeSpec::int(10, 18));
        assert_eq!(ranges.volume_window, RangeSpec::int(5, 9));
        assert_eq!(
            ranges.divergence_threshold,
            RangeSpec::float(0.005, 0.020, 0.001)
        );
    }

    #[test]
    fn medium_volatility_tier_matches_default_table() {
        let ranges = ParameterRanges::from_stats(&SeriesStats {
            volatility: 0.008,
            divergence_q70: 0.0,
            divergence_q95: 1.0,
        });
        assert_eq!(ranges, ParameterRanges::default());
    }

    #[test]
    fn high_volatility_tier_is_wider() {
        let ranges = ParameterRanges::from_stats(&SeriesStats {
            volatility: 0.03,
            divergence_q70: 0.05,
            divergence_q95: 0.06,
        });
        assert_eq!(ranges.long_window, RangeSpec::int(10, 32));
        assert_eq!(ranges.rsi_oversold, RangeSpec::int(22, 32));
        assert_eq!(
            ranges.divergence_threshold,
            RangeSpec::float(0.05, 0.06, 0.001)
        );
    }

    #[test]
    fn default_ranges_validate() {
        assert!(ParameterRanges::default().validate().is_ok());
    }

    #[test]
    fn inverted_range_rejected() {
        let ranges = ParameterRanges {
            rsi_period: RangeSpec::int(20, 10),
            ..ParameterRanges::default()
        };
        assert!(ranges.validate().is_err());

        let ranges = ParameterRanges {
            short_window: RangeSpec::float(2.0, 5.0, 0.5),
            ..ParameterRanges::default()
        };
        assert!(ranges.validate().is_err());
    }

    #[test]
    fn ranges_round_trip_through_json() {
        let json = serde_json::to_string(&ParameterRanges::default()).unwrap();
        assert!(json.contains("\"kind\":\"int\""));
        let back: ParameterRanges = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ParameterRanges::default());
    }
}
