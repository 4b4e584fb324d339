//! Candidate generation: uniform draws (phase 1) and local jitter (phase 2).
//!
//! All draws come from one caller-supplied generator so a seed reproduces
//! the whole candidate list.

use rand::Rng;

use super::search_space::{round_to, step_decimals, ParameterRanges, RangeSpec};
use crate::domain::params::ParameterFields;

/// Uniform draw from `spec`: integers inclusive, floats snapped to the step grid.
pub fn draw<R: Rng>(spec: &RangeSpec, rng: &mut R) -> f64 {
    match *spec {
        RangeSpec::Int { lo, hi } => rng.gen_range(lo..=hi) as f64,
        RangeSpec::Float { lo, hi, step } => {
            let raw = rng.gen_range(lo..=hi);
            round_to((raw / step).round() * step, step_decimals(step))
        }
    }
}

/// Perturb `value` uniformly within +/- `pct`, snap to the grid and clamp into `spec`.
pub fn jitter<R: Rng>(value: f64, pct: f64, spec: &RangeSpec, rng: &mut R) -> f64 {
    let low = value * (1.0 - pct);
    let high = value * (1.0 + pct);
    let raw = if low < high {
        rng.gen_range(low..high)
    } else {
        low
    };

    match *spec {
        RangeSpec::Int { lo, hi } => raw.clamp(lo as f64, hi as f64).round(),
        RangeSpec::Float { lo, hi, step } => {
            let snapped = (raw / step).round() * step;
            round_to(snapped.clamp(lo, hi), step_decimals(step))
        }
    }
}

fn as_window(value: f64) -> usize {
    if value < 1.0 { 1 } else { value as usize }
}

fn enforce_order(fields: &mut ParameterFields) {
    if fields.long_window <= fields.short_window {
        fields.long_window = fields.short_window + 1;
    }
}

/// Broad-search candidate drawn independently per dimension.
pub fn sample_uniform<R: Rng>(ranges: &ParameterRanges, rng: &mut R) -> ParameterFields {
    let mut fields = ParameterFields {
        short_window: as_window(draw(&ranges.short_window, rng)),
        long_window: as_window(draw(&ranges.long_window, rng)),
        ..ParameterFields::default()
    };
    enforce_order(&mut fields);
    fields.volume_window = as_window(draw(&ranges.volume_window, rng));
    fields.volume_surge_multiplier = draw(&ranges.volume_surge_multiplier, rng);
    fields.volume_sell_multiplier = draw(&ranges.volume_sell_multiplier, rng);
    fields.rsi_period = as_window(draw(&ranges.rsi_period, rng));
    fields.rsi_oversold = draw(&ranges.rsi_oversold, rng);
    fields.rsi_surge_multiplier = draw(&ranges.rsi_surge_multiplier, rng);
    fields.divergence_threshold = draw(&ranges.divergence_threshold, rng);
    fields
}

/// Refinement candidate: every dimension of `base` jittered by `pct`.
pub fn sample_around<R: Rng>(
    base: &ParameterFields,
    ranges: &ParameterRanges,
    pct: f64,
    rng: &mut R,
) -> ParameterFields {
    let mut fields = ParameterFields {
        short_window: as_window(jitter(base.short_window as f64, pct, &ranges.short_window, rng)),
        long_window: as_window(jitter(base.long_window as f64, pct, &ranges.long_window, rng)),
        ..*base
    };
    enforce_order(&mut fields);
    fields.volume_window = as_window(jitter(
        base.volume_window as f64,
        pct,
        &ranges.volume_window,
        rng,
    ));
    fields.volume_surge_multiplier = jitter(
        base.volume_surge_multiplier,
        pct,
        &ranges.volume_surge_multiplier,
        rng,
    );
    fields.volume_sell_multiplier = jitter(
        base.volume_sell_multiplier,
        pct,
        &ranges.volume_sell_multiplier,
        rng,
    );
    fields.rsi_period = as_window(jitter(base.rsi_period as f64, pct, &ranges.rsi_period, rng));
    fields.rsi_oversold = jitter(base.rsi_oversold, pct, &ranges.rsi_oversold, rng);
    fields.rsi_surge_multiplier = jitter(
        base.rsi_surge_multiplier,
        pct,
        &ranges.rsi_surge_multiplier,
        rng,
    );
    fields.divergence_threshold = jitter(
        base.divergence_threshold,
        pct,
        &ranges.divergence_threshold,
        rng,
    );
    fields
}
