//! CSV tables for ledgers, signal diagnostics and optimizer rankings.

use std::io::Write;

use crate::domain::backtest::Ledger;
use crate::domain::error::TraderError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::optimizer::evaluation::{CandidateEvaluation, WindowSummary};
use crate::domain::signal::RuleEvaluation;

const LEDGER_HEADER: [&str; 9] = [
    "date",
    "signal",
    "cash",
    "shares",
    "holdings",
    "total",
    "returns",
    "cumulative_returns",
    "commission_paid",
];

const SIGNALS_HEADER: [&str; 16] = [
    "date",
    "close",
    "volume",
    "short_ma",
    "long_ma",
    "volume_ma",
    "rsi",
    "ma_state",
    "cross_up",
    "cross_down",
    "divergence_ratio",
    "ma_buy",
    "rsi_buy",
    "divergence_buy",
    "sell",
    "signal",
];

const PARAM_COLUMNS: [&str; 9] = [
    "short_window",
    "long_window",
    "volume_window",
    "volume_surge_multiplier",
    "volume_sell_multiplier",
    "rsi_period",
    "rsi_oversold",
    "rsi_surge_multiplier",
    "divergence_threshold",
];

const WINDOW_COLUMNS: [&str; 5] = [
    "annualized_return",
    "sharpe_ratio",
    "max_drawdown",
    "trade_count",
    "win_rate",
];

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

pub fn write_ledger_csv<W: Write>(writer: W, ledger: &Ledger) -> Result<(), TraderError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(LEDGER_HEADER)?;

    let returns = ledger.returns();
    let cumulative = ledger.cumulative_returns();
    for (i, state) in ledger.states.iter().enumerate() {
        wtr.write_record([
            state.date.to_string(),
            state.executed.as_i8().to_string(),
            format!("{:.4}", state.cash),
            state.shares.to_string(),
            format!("{:.4}", state.holdings_value),
            format!("{:.4}", state.total_value),
            format!("{:.8}", returns[i]),
            format!("{:.8}", cumulative[i]),
            format!("{:.4}", state.commission_paid),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_signals_csv<W: Write>(
    writer: W,
    bars: &[PriceBar],
    evaluation: &RuleEvaluation,
) -> Result<(), TraderError> {
    if evaluation.signals.len() != bars.len() {
        return Err(TraderError::SignalLengthMismatch {
            bars: bars.len(),
            signals: evaluation.signals.len(),
        });
    }

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(SIGNALS_HEADER)?;

    let frame = &evaluation.frame;
    for (i, bar) in bars.iter().enumerate() {
        let cond = &evaluation.conditions[i];
        wtr.write_record([
            bar.date.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
            format!("{:.6}", frame.short_ma[i]),
            format!("{:.6}", frame.long_ma[i]),
            format!("{:.2}", frame.volume_ma[i]),
            frame.rsi[i].map(|r| format!("{r:.4}")).unwrap_or_default(),
            flag(cond.ma_state).to_string(),
            flag(cond.cross_up).to_string(),
            flag(cond.cross_down).to_string(),
            format!("{:.6}", cond.divergence_ratio),
            flag(cond.ma_buy).to_string(),
            flag(cond.rsi_buy).to_string(),
            flag(cond.divergence_buy).to_string(),
            flag(cond.sell).to_string(),
            evaluation.signals[i].as_i8().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn window_fields(summary: &WindowSummary) -> [String; 5] {
    [
        format!("{:.6}", summary.annualized_return),
        format!("{:.6}", summary.sharpe_ratio),
        format!("{:.6}", summary.max_drawdown),
        summary.trade_count.to_string(),
        format!("{:.4}", summary.win_rate),
    ]
}

/// One row per candidate: rank, score, every parameter, then train and
/// validation metrics.
pub fn write_rankings_csv<W: Write>(
    writer: W,
    candidates: &[CandidateEvaluation],
) -> Result<(), TraderError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = vec!["rank".into(), "score".into()];
    header.extend(PARAM_COLUMNS.iter().map(|c| c.to_string()));
    header.extend(WINDOW_COLUMNS.iter().map(|c| format!("train_{c}")));
    header.extend(WINDOW_COLUMNS.iter().map(|c| format!("validation_{c}")));
    wtr.write_record(&header)?;

    for (i, candidate) in candidates.iter().enumerate() {
        let p = candidate.params.fields();
        let mut row = vec![
            (i + 1).to_string(),
            format!("{:.6}", candidate.score),
            p.short_window.to_string(),
            p.long_window.to_string(),
            p.volume_window.to_string(),
            p.volume_surge_multiplier.to_string(),
            p.volume_sell_multiplier.to_string(),
            p.rsi_period.to_string(),
            p.rsi_oversold.to_string(),
            p.rsi_surge_multiplier.to_string(),
            p.divergence_threshold.to_string(),
        ];
        row.extend(window_fields(&candidate.train));
        row.extend(window_fields(&candidate.validation));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}
