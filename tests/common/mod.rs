#![allow(dead_code)]

use chrono::NaiveDate;
use etftrader::domain::error::TraderError;
pub use etftrader::domain::ohlcv::PriceBar;
use etftrader::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<PriceBar>, TraderError> {
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            _ => Err(TraderError::NoData {
                symbol: symbol.to_string(),
            }),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(day: NaiveDate, close: f64, volume: u64) -> PriceBar {
    PriceBar {
        date: day,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume,
        turnover_rate: None,
    }
}

/// Consecutive daily bars with the given closes and volumes.
pub fn bars_from(closes: &[f64], volumes: &[u64]) -> Vec<PriceBar> {
    let start = date(2023, 1, 2);
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| make_bar(start + chrono::Duration::days(i as i64), close, volume))
        .collect()
}

pub fn flat_bars(count: usize, price: f64) -> Vec<PriceBar> {
    bars_from(&vec![price; count], &vec![1_000; count])
}

/// Oscillating uptrend with volume bursts near the turns, so MA crosses and
/// volume-confirmed signals both occur.
pub fn wave_bars(count: usize) -> Vec<PriceBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| {
            let t = i as f64;
            10.0 + 1.5 * (t / 9.0).sin() + 0.5 * (t / 3.7).cos() + t * 0.01
        })
        .collect();
    let volumes: Vec<u64> = (0..count)
        .map(|i| 10_000 + ((i * 7919) % 13) as u64 * 1_500 + if i % 17 == 0 { 40_000 } else { 0 })
        .collect();
    bars_from(&closes, &volumes)
}
