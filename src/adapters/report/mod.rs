//! File-based run artifacts.
//!
//! Everything lands in one output directory, named after the symbol:
//! - `<symbol>_ledger.csv`: per-day portfolio state
//! - `<symbol>_signals.csv`: per-bar indicators, condition flags and signal
//! - `<symbol>_optimization.log`: ranked, human-readable optimizer results
//! - `<symbol>_top<k>.csv`: the same ranking as a flat table, `k` being the
//!   configured ranking size

pub mod ranking_log;
pub mod tables;

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::backtest::Ledger;
use crate::domain::error::TraderError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::optimizer::OptimizationReport;
use crate::domain::signal::RuleEvaluation;
use crate::ports::report_port::ReportPort;

pub struct FileReportAdapter {
    output_dir: PathBuf,
}

impl FileReportAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn target(&self, file_name: String) -> Result<PathBuf, TraderError> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(file_name))
    }
}

impl ReportPort for FileReportAdapter {
    fn write_ledger(&self, symbol: &str, ledger: &Ledger) -> Result<(), TraderError> {
        let path = self.target(format!("{symbol}_ledger.csv"))?;
        tables::write_ledger_csv(fs::File::create(&path)?, ledger)?;
        tracing::info!(symbol, path = %path.display(), rows = ledger.len(), "ledger written");
        Ok(())
    }

    fn write_signals(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        evaluation: &RuleEvaluation,
    ) -> Result<(), TraderError> {
        let path = self.target(format!("{symbol}_signals.csv"))?;
        tables::write_signals_csv(fs::File::create(&path)?, bars, evaluation)?;
        tracing::info!(symbol, path = %path.display(), rows = bars.len(), "signals written");
        Ok(())
    }

    fn write_rankings(&self, symbol: &str, report: &OptimizationReport) -> Result<(), TraderError> {
        let log_path = self.target(format!("{symbol}_optimization.log"))?;
        fs::write(&log_path, ranking_log::render(symbol, report))?;

        let table_path = self.target(format!("{symbol}_top{}.csv", report.top_k))?;
        tables::write_rankings_csv(fs::File::create(&table_path)?, &report.top)?;

        tracing::info!(
            symbol,
            log = %log_path.display(),
            table = %table_path.display(),
            candidates = report.top.len(),
            "rankings written"
        );
        Ok(())
    }
}
