//! Human-readable optimizer ranking.

use crate::domain::backtest::BacktestWindow;
use crate::domain::optimizer::evaluation::{CandidateEvaluation, Constraints, WindowSummary};
use crate::domain::optimizer::{OptimizationReport, PhaseStats};

fn format_window(window: &BacktestWindow) -> String {
    let bound = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
    format!("{} .. {}", bound(window.start), bound(window.end))
}

fn format_phase(name: &str, stats: &PhaseStats) -> String {
    let mut line = format!(
        "{name}: {} evaluated, {} accepted, {} rejected, {} failed",
        stats.evaluated, stats.accepted, stats.rejected, stats.failed
    );
    if let Some(first) = &stats.first_failure {
        line.push_str(&format!(" (first failure: {first})"));
    }
    line
}

fn format_ranking_rule(validation_weight: f64) -> String {
    format!(
        "ranking: score = {:.2} * validation sharpe + {:.2} * train sharpe; \
         ties: lower train drawdown, more train trades, higher train win rate",
        validation_weight,
        1.0 - validation_weight
    )
}

fn format_constraints(constraints: &Constraints) -> String {
    format!(
        "constraints: train max drawdown <= {:.1}%, train trades >= {}",
        constraints.max_train_drawdown * 100.0,
        constraints.min_train_trades
    )
}

pub fn format_summary(summary: &WindowSummary) -> String {
    format!(
        "annualized {:+.2}%, sharpe {:.3}, max drawdown {:.2}%, trades {}, win rate {:.1}%",
        summary.annualized_return * 100.0,
        summary.sharpe_ratio,
        summary.max_drawdown * 100.0,
        summary.trade_count,
        summary.win_rate * 100.0
    )
}

pub fn format_params(candidate: &CandidateEvaluation) -> String {
    let p = candidate.params.fields();
    format!(
        "short_window={} long_window={} volume_window={} volume_surge_multiplier={} \
         volume_sell_multiplier={} rsi_period={} rsi_oversold={} rsi_surge_multiplier={} \
         divergence_threshold={}",
        p.short_window,
        p.long_window,
        p.volume_window,
        p.volume_surge_multiplier,
        p.volume_sell_multiplier,
        p.rsi_period,
        p.rsi_oversold,
        p.rsi_surge_multiplier,
        p.divergence_threshold
    )
}

pub fn render(symbol: &str, report: &OptimizationReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("Optimization results for {symbol}\n"));
    output.push_str(&format!("train window:      {}\n", format_window(&report.train_window)));
    output.push_str(&format!(
        "validation window: {}\n",
        format_window(&report.validation_window)
    ));
    match report.seed {
        Some(seed) => output.push_str(&format!("seed: {seed}\n")),
        None => output.push_str("seed: entropy\n"),
    }
    output.push_str(&format_ranking_rule(report.validation_weight));
    output.push('\n');
    output.push_str(&format_constraints(&report.constraints));
    output.push('\n');
    output.push_str(&format_phase("phase 1", &report.phase1));
    output.push('\n');
    output.push_str(&format_phase("phase 2", &report.phase2));
    output.push_str("\n\n");

    if report.top.is_empty() {
        output.push_str("no valid parameter combination found\n");
        return output;
    }

    for (i, candidate) in report.top.iter().enumerate() {
        output.push_str(&format!("#{} score {:.4}\n", i + 1, candidate.score));
        output.push_str(&format!("  params:     {}\n", format_params(candidate)));
        output.push_str(&format!("  train:      {}\n", format_summary(&candidate.train)));
        output.push_str(&format!(
            "  validation: {}\n",
            format_summary(&candidate.validation)
        ));
        let notes = candidate.risk_notes();
        if !notes.is_empty() {
            output.push_str(&format!("  risk:       {}\n", notes.join("; ")));
        }
        output.push('\n');
    }
    output
}
