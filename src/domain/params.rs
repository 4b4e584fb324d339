//! Strategy hyperparameters.
//!
//! `StrategyParameters` is the validated value object consumed by the rule
//! engine. `ParameterFields` is the unvalidated bag used by configuration,
//! sampling and serialization; conversion checks positivity and short < long.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::TraderError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterFields {
    pub short_window: usize,
    pub long_window: usize,
    pub volume_window: usize,
    pub volume_surge_multiplier: f64,
    pub volume_sell_multiplier: f64,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_surge_multiplier: f64,
    pub divergence_threshold: f64,
}

impl Default for ParameterFields {
    fn default() -> Self {
        ParameterFields {
            short_window: 5,
            long_window: 16,
            volume_window: 10,
            volume_surge_multiplier: 1.1,
            volume_sell_multiplier: 4.5,
            rsi_period: 13,
            rsi_oversold: 30.0,
            rsi_surge_multiplier: 1.5,
            divergence_threshold: 0.06,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterFields", into = "ParameterFields")]
pub struct StrategyParameters {
    fields: ParameterFields,
}

impl StrategyParameters {
    pub fn new(fields: ParameterFields) -> Result<Self, TraderError> {
        let invalid = |reason: String| Err(TraderError::InvalidParameters { reason });

        let windows = [
            ("short_window", fields.short_window),
            ("long_window", fields.long_window),
            ("volume_window", fields.volume_window),
            ("rsi_period", fields.rsi_period),
        ];
        for (name, value) in windows {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }

        let reals = [
            ("volume_surge_multiplier", fields.volume_surge_multiplier),
            ("volume_sell_multiplier", fields.volume_sell_multiplier),
            ("rsi_oversold", fields.rsi_oversold),
            ("rsi_surge_multiplier", fields.rsi_surge_multiplier),
            ("divergence_threshold", fields.divergence_threshold),
        ];
        for (name, value) in reals {
            if !value.is_finite() || value <= 0.0 {
                return invalid(format!("{name} must be a positive number, got {value}"));
            }
        }

        if fields.short_window >= fields.long_window {
            return invalid(format!(
                "short_window ({}) must be less than long_window ({})",
                fields.short_window, fields.long_window
            ));
        }

        Ok(StrategyParameters { fields })
    }

    pub fn fields(&self) -> &ParameterFields {
        &self.fields
    }

    pub fn short_window(&self) -> usize {
        self.fields.short_window
    }

    pub fn long_window(&self) -> usize {
        self.fields.long_window
    }

    pub fn volume_window(&self) -> usize {
        self.fields.volume_window
    }

    pub fn volume_surge_multiplier(&self) -> f64 {
        self.fields.volume_surge_multiplier
    }

    pub fn volume_sell_multiplier(&self) -> f64 {
        self.fields.volume_sell_multiplier
    }

    pub fn rsi_period(&self) -> usize {
        self.fields.rsi_period
    }

    pub fn rsi_oversold(&self) -> f64 {
        self.fields.rsi_oversold
    }

    pub fn rsi_surge_multiplier(&self) -> f64 {
        self.fields.rsi_surge_multiplier
    }

    pub fn divergence_threshold(&self) -> f64 {
        self.fields.divergence_threshold
    }

    /// Longest rolling window; a series shorter than this is rejected.
    pub fn longest_window(&self) -> usize {
        self.fields
            .long_window
            .max(self.fields.volume_window)
            .max(self.fields.rsi_period)
    }
}

impl Default for StrategyParameters {
    fn default() -> Self {
        StrategyParameters {
            fields: ParameterFields::default(),
        }
    }
}

impl TryFrom<ParameterFields> for StrategyParameters {
    type Error = TraderError;

    fn try_from(fields: ParameterFields) -> Result<Self, Self::Error> {
        StrategyParameters::new(fields)
    }
}

impl From<StrategyParameters> for ParameterFields {
    fn from(params: StrategyParameters) -> Self {
        params.fields
    }
}

impl fmt::Display for StrategyParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.fields;
        write!(
            f,
            "MA({}/{}) VOL({}) surge={:.2} sell={:.2} RSI({}) <{:.0} x{:.2} div>{:.3}",
            p.short_window,
            p.long_window,
            p.volume_window,
            p.volume_surge_multiplier,
            p.volume_sell_multiplier,
            p.rsi_period,
            p.rsi_oversold,
            p.rsi_surge_multiplier,
            p.divergence_threshold
        )
    }
}
