//! Per-symbol cache of optimizer search ranges.

use crate::domain::error::TraderError;
use crate::domain::optimizer::search_space::ParameterRanges;

pub trait RangeStore {
    fn load(&self, symbol: &str) -> Result<Option<ParameterRanges>, TraderError>;
    fn save(&self, symbol: &str, ranges: &ParameterRanges) -> Result<(), TraderError>;
}
