//! Daily price bar representation and series validation.

use chrono::NaiveDate;

use super::error::TraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub turnover_rate: Option<f64>,
}

/// Check that `bars` is strictly time-ordered, carries positive prices and
/// holds at least `minimum` entries.
pub fn validate_series(bars: &[PriceBar], minimum: usize) -> Result<(), TraderError> {
    if bars.len() < minimum {
        return Err(TraderError::InsufficientData {
            bars: bars.len(),
            minimum,
        });
    }

    for (i, bar) in bars.iter().enumerate() {
        if !(bar.open > 0.0 && bar.high > 0.0 && bar.low > 0.0 && bar.close > 0.0) {
            return Err(TraderError::InvalidBar {
                date: bar.date,
                reason: "prices must be positive".into(),
            });
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(TraderError::UnorderedSeries { date: bar.date });
        }
    }

    Ok(())
}

/// Sort by date and keep the last bar seen for any duplicated date.
pub fn sort_and_dedup(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|b| b.date);
    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}
