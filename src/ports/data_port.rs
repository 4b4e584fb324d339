//! Daily bar data access port trait.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Complete, date-ordered, deduplicated daily history for `symbol`.
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<PriceBar>, TraderError>;

    /// First date, last date and bar count, or `None` when no data exists.
    fn data_range(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TraderError> {
        let bars = match self.fetch_bars(symbol) {
            Ok(bars) => bars,
            Err(TraderError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}
