//! Simple moving average over a trailing window.
//!
//! Early bars with fewer than `window` observations receive the mean of what
//! is available (minimum one observation), so the output is always defined.

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return vec![f64::NAN; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        out.push(sum / count as f64);
    }

    out
}

/// Rolling mean that stays undefined until a full window is available.
pub fn rolling_mean_full(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_mean(values, window)
        .into_iter()
        .enumerate()
        .map(|(i, v)| if window > 0 && i + 1 >= window { Some(v) } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn partial_means_during_warmup() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_relative_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], 1.5);
        assert_relative_eq!(out[2], 2.0);
        assert_relative_eq!(out[3], 3.0);
        assert_relative_eq!(out[4], 4.0);
    }

    #[test]
    fn window_of_one_is_identity() {
        let values = [3.0, 7.0, 1.0];
        assert_eq!(rolling_mean(&values, 1), values.to_vec());
    }

    #[test]
    fn window_longer_than_series() {
        let out = rolling_mean(&[2.0, 4.0], 10);
        assert_relative_eq!(out[1], 3.0);
    }

    #[test]
    fn empty_input() {
        assert!(rolling_mean(&[], 5).is_empty());
    }

    #[test]
    fn full_window_variant_marks_warmup() {
        let out = rolling_mean_full(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[3], Some(3.0));
    }
}
