//! Two-phase stochastic parameter search.
//!
//! The series is split chronologically into a train window (first
//! `train_ratio` of bars) and a validation window (the rest).
//!
//! 1. Phase 1 draws `phase1_samples` candidates uniformly from the ranges,
//!    evaluates them in parallel and keeps the best `top_k`.
//! 2. Phase 2 draws `phase2_samples` candidates, each a jittered copy of a
//!    randomly chosen phase 1 survivor.
//! 3. Survivors of both phases are merged, re-ranked and cut to `top_k`.
//!
//! A candidate is accepted only if its train window passes [`Constraints`];
//! accepted candidates are scored with [`evaluation::composite_score`].

pub mod evaluation;
pub mod sampler;
pub mod search_space;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::backtest::{BacktestWindow, SizingConfig};
use crate::domain::error::TraderError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::params::ParameterFields;
use crate::ports::range_port::RangeStore;

use evaluation::{
    evaluate_candidate, rank_candidates, CandidateEvaluation, CandidateEvaluator, Constraints,
    EvaluationOutcome,
};
use search_space::{ParameterRanges, SeriesStats};

/// What to do with candidates whose evaluation errored or panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the candidate and count it.
    #[default]
    Discard,
    /// Fail the whole run.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(FailurePolicy::Discard),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(format!("unknown failure policy '{other}' (expected discard or abort)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub phase1_samples: usize,
    pub phase2_samples: usize,
    pub top_k: usize,
    pub jitter_pct: f64,
    pub train_ratio: f64,
    pub validation_weight: f64,
    pub constraints: Constraints,
    pub min_bars: usize,
    pub seed: Option<u64>,
    /// Worker threads; `None` uses one per CPU core.
    pub workers: Option<usize>,
    pub failure_policy: FailurePolicy,
    /// Sizing used for every candidate backtest.
    pub sizing: SizingConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            phase1_samples: 2000,
            phase2_samples: 1000,
            top_k: 50,
            jitter_pct: 0.10,
            train_ratio: 0.7,
            validation_weight: 0.7,
            constraints: Constraints::default(),
            min_bars: 100,
            seed: None,
            workers: None,
            failure_policy: FailurePolicy::Discard,
            sizing: SizingConfig {
                initial_capital: 10_000.0,
                buy_increment: 1.0,
                sell_decrement: 1.0,
                ..SizingConfig::default()
            },
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        let invalid = |reason: String| Err(TraderError::InvalidParameters { reason });

        if self.phase1_samples == 0 {
            return invalid("phase1_samples must be positive".into());
        }
        if self.top_k == 0 {
            return invalid("top_k must be positive".into());
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return invalid(format!("train_ratio must be in (0, 1), got {}", self.train_ratio));
        }
        if !(0.0..=1.0).contains(&self.validation_weight) {
            return invalid(format!(
                "validation_weight must be in [0, 1], got {}",
                self.validation_weight
            ));
        }
        if !(0.0..1.0).contains(&self.jitter_pct) {
            return invalid(format!("jitter_pct must be in [0, 1), got {}", self.jitter_pct));
        }
        if !(self.constraints.max_train_drawdown >= 0.0) {
            return invalid("max_train_drawdown must be non-negative".into());
        }
        if self.workers == Some(0) {
            return invalid("workers must be positive".into());
        }
        self.sizing.validate()
    }
}

/// Per-phase outcome counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseStats {
    pub evaluated: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub first_failure: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OptimizationReport {
    pub train_window: BacktestWindow,
    pub validation_window: BacktestWindow,
    pub ranges: ParameterRanges,
    pub seed: Option<u64>,
    /// Configured ranking size; `top` may hold fewer.
    pub top_k: usize,
    pub constraints: Constraints,
    pub validation_weight: f64,
    pub phase1: PhaseStats,
    pub phase2: PhaseStats,
    /// Best candidates, best first. Empty when nothing passed the constraints.
    pub top: Vec<CandidateEvaluation>,
}

impl OptimizationReport {
    pub fn best(&self) -> Option<&CandidateEvaluation> {
        self.top.first()
    }

    pub fn total_failed(&self) -> usize {
        self.phase1.failed + self.phase2.failed
    }
}

/// Chronological train/validation windows: train is `[0, split)` and
/// validation `[split, len)` with `split = floor(len * train_ratio)`.
pub fn split_windows(
    bars: &[PriceBar],
    train_ratio: f64,
) -> Result<(BacktestWindow, BacktestWindow), TraderError> {
    let split = (bars.len() as f64 * train_ratio) as usize;
    if split == 0 || split >= bars.len() {
        return Err(TraderError::Optimizer {
            reason: format!(
                "train ratio {train_ratio} leaves an empty window over {} bars",
                bars.len()
            ),
        });
    }
    Ok((
        BacktestWindow::between(bars[0].date, bars[split - 1].date),
        BacktestWindow::between(bars[split].date, bars[bars.len() - 1].date),
    ))
}

/// Pick search ranges: explicit ranges win, then the per-symbol cache,
/// otherwise derive them from the series and store them in the cache.
pub fn resolve_ranges(
    symbol: &str,
    bars: &[PriceBar],
    explicit: Option<ParameterRanges>,
    store: Option<&dyn RangeStore>,
) -> Result<ParameterRanges, TraderError> {
    if let Some(ranges) = explicit {
        return Ok(ranges);
    }
    if let Some(store) = store {
        match store.load(symbol) {
            Ok(Some(ranges)) => {
                tracing::info!(symbol, "using cached search ranges");
                return Ok(ranges);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(symbol, error = %e, "ignoring unreadable range cache"),
        }
    }

    let stats = SeriesStats::from_bars(bars);
    let ranges = ParameterRanges::from_stats(&stats);
    tracing::info!(
        symbol,
        volatility = stats.volatility,
        divergence_q70 = stats.divergence_q70,
        divergence_q95 = stats.divergence_q95,
        "derived search ranges from series statistics"
    );
    if let Some(store) = store {
        if let Err(e) = store.save(symbol, &ranges) {
            tracing::warn!(symbol, error = %e, "failed to cache search ranges");
        }
    }
    Ok(ranges)
}

struct PhaseContext<'a> {
    pool: &'a rayon::ThreadPool,
    evaluator: &'a dyn CandidateEvaluator,
    train_window: BacktestWindow,
    validation_window: BacktestWindow,
    config: &'a OptimizerConfig,
}

impl PhaseContext<'_> {
    fn run(
        &self,
        phase: &'static str,
        candidates: &[ParameterFields],
    ) -> (Vec<CandidateEvaluation>, PhaseStats) {
        let total = candidates.len();
        let step = (total / 20).max(1);
        let completed = AtomicUsize::new(0);
        tracing::info!(phase, total, "phase started");

        let outcomes: Vec<EvaluationOutcome> = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|fields| {
                    let outcome = evaluate_candidate(
                        self.evaluator,
                        fields,
                        &self.train_window,
                        &self.validation_window,
                        &self.config.constraints,
                        self.config.validation_weight,
                    );
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % step == 0 || done == total {
                        tracing::info!(
                            phase,
                            completed = done,
                            total,
                            "progress"
                        );
                    }
                    outcome
                })
                .collect()
        });

        let mut stats = PhaseStats {
            evaluated: total,
            ..PhaseStats::default()
        };
        let mut accepted = Vec::new();
        for outcome in outcomes {
            match outcome {
                EvaluationOutcome::Accepted(c) => {
                    stats.accepted += 1;
                    accepted.push(c);
                }
                EvaluationOutcome::Rejected(_) => stats.rejected += 1,
                EvaluationOutcome::Failed(reason) => {
                    stats.failed += 1;
                    if stats.first_failure.is_none() {
                        stats.first_failure = Some(reason);
                    }
                }
            }
        }

        tracing::info!(
            phase,
            accepted = stats.accepted,
            rejected = stats.rejected,
            failed = stats.failed,
            "phase finished"
        );
        if stats.failed > 0 {
            tracing::warn!(
                phase,
                failed = stats.failed,
                first = stats.first_failure.as_deref().unwrap_or_default(),
                "candidate evaluations failed"
            );
        }
        (accepted, stats)
    }

    fn enforce_policy(&self, stats: &PhaseStats) -> Result<(), TraderError> {
        if self.config.failure_policy == FailurePolicy::Abort && stats.failed > 0 {
            return Err(TraderError::CandidateFailures {
                failed: stats.failed,
                first: stats.first_failure.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Run the two-phase search over `bars` with `evaluator` as fitness function.
pub fn optimize(
    bars: &[PriceBar],
    ranges: &ParameterRanges,
    evaluator: &dyn CandidateEvaluator,
    config: &OptimizerConfig,
) -> Result<OptimizationReport, TraderError> {
    config.validate()?;
    ranges.validate()?;
    if bars.len() < config.min_bars {
        return Err(TraderError::InsufficientData {
            bars: bars.len(),
            minimum: config.min_bars,
        });
    }

    let (train_window, validation_window) = split_windows(bars, config.train_ratio)?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.unwrap_or(0))
        .build()
        .map_err(|e| TraderError::Optimizer {
            reason: format!("failed to start worker pool: {e}"),
        })?;
    tracing::info!(
        workers = pool.current_num_threads(),
        bars = bars.len(),
        seed = ?config.seed,
        "optimizer starting"
    );

    let ctx = PhaseContext {
        pool: &pool,
        evaluator,
        train_window,
        validation_window,
        config,
    };

    let phase1_candidates: Vec<ParameterFields> = (0..config.phase1_samples)
        .map(|_| sampler::sample_uniform(ranges, &mut rng))
        .collect();
    let (mut bases, phase1) = ctx.run("phase1", &phase1_candidates);
    ctx.enforce_policy(&phase1)?;
    rank_candidates(&mut bases);
    bases.truncate(config.top_k);

    let mut report = OptimizationReport {
        train_window,
        validation_window,
        ranges: ranges.clone(),
        seed: config.seed,
        top_k: config.top_k,
        constraints: config.constraints,
        validation_weight: config.validation_weight,
        phase1,
        phase2: PhaseStats::default(),
        top: Vec::new(),
    };

    if bases.is_empty() {
        tracing::warn!("no candidate passed the train constraints in phase 1");
        return Ok(report);
    }

    let phase2_candidates: Vec<ParameterFields> = (0..config.phase2_samples)
        .map(|_| {
            let base = &bases[rng.gen_range(0..bases.len())];
            sampler::sample_around(base.params.fields(), ranges, config.jitter_pct, &mut rng)
        })
        .collect();
    let (refined, phase2) = ctx.run("phase2", &phase2_candidates);
    ctx.enforce_policy(&phase2)?;

    let mut merged = bases;
    merged.extend(refined);
    rank_candidates(&mut merged);
    merged.truncate(config.top_k);

    report.phase2 = phase2;
    report.top = merged;
    Ok(report)
}
