//! Fitness evaluation of one candidate over the train and validation windows.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::domain::backtest::{run_backtest, BacktestWindow, SizingConfig};
use crate::domain::error::TraderError;
use crate::domain::metrics::PerformanceReport;
use crate::domain::ohlcv::PriceBar;
use crate::domain::params::{ParameterFields, StrategyParameters};
use crate::domain::signal::generate_signals;

/// Metrics of one backtest window, as used for filtering and ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowSummary {
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub win_rate: f64,
}

impl From<&PerformanceReport> for WindowSummary {
    fn from(report: &PerformanceReport) -> Self {
        WindowSummary {
            annualized_return: report.annualized_return,
            sharpe_ratio: report.sharpe_ratio,
            max_drawdown: report.max_drawdown,
            trade_count: report.trade_count,
            win_rate: report.win_rate,
        }
    }
}

/// Fitness function seam: backtest a parameter vector over one window.
pub trait CandidateEvaluator: Sync {
    fn evaluate_window(
        &self,
        params: &StrategyParameters,
        window: &BacktestWindow,
    ) -> Result<WindowSummary, TraderError>;
}

/// Production evaluator: full signal pipeline plus backtest on the window.
pub struct BacktestEvaluator<'a> {
    bars: &'a [PriceBar],
    sizing: SizingConfig,
}

impl<'a> BacktestEvaluator<'a> {
    pub fn new(bars: &'a [PriceBar], sizing: SizingConfig) -> Self {
        BacktestEvaluator { bars, sizing }
    }
}

impl CandidateEvaluator for BacktestEvaluator<'_> {
    fn evaluate_window(
        &self,
        params: &StrategyParameters,
        window: &BacktestWindow,
    ) -> Result<WindowSummary, TraderError> {
        let signals = generate_signals(self.bars, params)?;
        let ledger = run_backtest(self.bars, &signals, &self.sizing, window)?;
        Ok(WindowSummary::from(&PerformanceReport::compute(&ledger)))
    }
}

/// Hard filters applied to the train window before scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraints {
    /// Ceiling on |train max drawdown|.
    pub max_train_drawdown: f64,
    pub min_train_trades: usize,
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            max_train_drawdown: 0.20,
            min_train_trades: 5,
        }
    }
}

impl Constraints {
    pub fn check(&self, train: &WindowSummary) -> Result<(), ConstraintViolation> {
        if train.max_drawdown.abs() > self.max_train_drawdown {
            return Err(ConstraintViolation::Drawdown {
                drawdown: train.max_drawdown,
                ceiling: self.max_train_drawdown,
            });
        }
        if train.trade_count < self.min_train_trades {
            return Err(ConstraintViolation::TooFewTrades {
                trades: train.trade_count,
                floor: self.min_train_trades,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    Drawdown { drawdown: f64, ceiling: f64 },
    TooFewTrades { trades: usize, floor: usize },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::Drawdown { drawdown, ceiling } => write!(
                f,
                "train drawdown {:.2}% exceeds {:.2}%",
                drawdown.abs() * 100.0,
                ceiling * 100.0
            ),
            ConstraintViolation::TooFewTrades { trades, floor } => {
                write!(f, "train trades {trades} below {floor}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateEvaluation {
    pub params: StrategyParameters,
    pub train: WindowSummary,
    pub validation: WindowSummary,
    pub score: f64,
}

impl CandidateEvaluation {
    /// Validation notes worth flagging next to a ranked candidate.
    pub fn risk_notes(&self) -> Vec<&'static str> {
        let mut notes = Vec::new();
        if self.validation.max_drawdown.abs() > 0.12 {
            notes.push("validation drawdown > 12%");
        }
        if self.validation.trade_count < 10 {
            notes.push("validation trades < 10");
        }
        notes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Accepted(CandidateEvaluation),
    Rejected(ConstraintViolation),
    Failed(String),
}

/// Score weights: `validation_weight * validation sharpe + (1 - w) * train sharpe`.
pub fn composite_score(train: &WindowSummary, validation: &WindowSummary, validation_weight: f64) -> f64 {
    validation_weight * validation.sharpe_ratio + (1.0 - validation_weight) * train.sharpe_ratio
}

/// Evaluate train first, filter, then evaluate validation and score.
///
/// Errors and panics raised by the evaluator become `Failed`.
pub fn evaluate_candidate(
    evaluator: &dyn CandidateEvaluator,
    fields: &ParameterFields,
    train_window: &BacktestWindow,
    validation_window: &BacktestWindow,
    constraints: &Constraints,
    validation_weight: f64,
) -> EvaluationOutcome {
    let params = match StrategyParameters::new(*fields) {
        Ok(p) => p,
        Err(e) => return EvaluationOutcome::Failed(e.to_string()),
    };

    let run = || -> Result<EvaluationOutcome, TraderError> {
        let train = evaluator.evaluate_window(&params, train_window)?;
        if let Err(violation) = constraints.check(&train) {
            return Ok(EvaluationOutcome::Rejected(violation));
        }
        let validation = evaluator.evaluate_window(&params, validation_window)?;
        Ok(EvaluationOutcome::Accepted(CandidateEvaluation {
            params,
            train,
            validation,
            score: composite_score(&train, &validation, validation_weight),
        }))
    };

    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => EvaluationOutcome::Failed(e.to_string()),
        Err(payload) => EvaluationOutcome::Failed(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic during evaluation".to_string()
    }
}

/// Descending rank: score, then smaller |train drawdown|, more train trades,
/// higher train win rate.
pub fn rank_order(a: &CandidateEvaluation, b: &CandidateEvaluation) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.train.max_drawdown.abs().total_cmp(&b.train.max_drawdown.abs()))
        .then_with(|| b.train.trade_count.cmp(&a.train.trade_count))
        .then_with(|| b.train.win_rate.total_cmp(&a.train.win_rate))
}

pub fn rank_candidates(candidates: &mut [CandidateEvaluation]) {
    candidates.sort_by(rank_order);
}
