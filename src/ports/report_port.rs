//! Report output port trait.

use crate::domain::backtest::Ledger;
use crate::domain::error::TraderError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::optimizer::OptimizationReport;
use crate::domain::signal::RuleEvaluation;

/// Port for exporting run artifacts. Location and format belong to the adapter.
pub trait ReportPort {
    /// Day-indexed portfolio ledger.
    fn write_ledger(&self, symbol: &str, ledger: &Ledger) -> Result<(), TraderError>;

    /// Per-bar signal and condition diagnostics.
    fn write_signals(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        evaluation: &RuleEvaluation,
    ) -> Result<(), TraderError>;

    /// Ranked optimizer candidates.
    fn write_rankings(&self, symbol: &str, report: &OptimizationReport) -> Result<(), TraderError>;
}
