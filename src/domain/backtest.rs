//! Position-sizing backtest simulator.
//!
//! Walks the bar series one day at a time. Each day carries forward the
//! previous day's cash and shares, executes at most one trade at the close,
//! and marks the position to market:
//!
//! - Buy: spend `min(buy_increment * initial_capital, room, cash)` where
//!   `room = max_allocation * prior_total - position_value`, floored to whole lots.
//! - Sell: sell `shares * sell_decrement` floored to whole lots; a fraction
//!   that floors to zero sells one lot (or the odd remainder below one lot).

use chrono::NaiveDate;
use std::ops::Range;

use super::error::TraderError;
use super::ohlcv::PriceBar;
use super::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    /// Ceiling on position value as a fraction of the prior day's total value.
    pub max_allocation: f64,
    /// Spend per Buy as a fraction of initial capital.
    pub buy_increment: f64,
    /// Shares sold per Sell as a fraction of current holdings.
    pub sell_decrement: f64,
    pub lot_size: u64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            initial_capital: 100_000.0,
            commission_rate: 0.0003,
            max_allocation: 1.0,
            buy_increment: 0.2,
            sell_decrement: 0.5,
            lot_size: 100,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        let invalid = |reason: String| Err(TraderError::InvalidParameters { reason });

        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return invalid(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            ));
        }
        if !(0.0..1.0).contains(&self.commission_rate) {
            return invalid(format!(
                "commission_rate must be in [0, 1), got {}",
                self.commission_rate
            ));
        }
        let fractions = [
            ("max_allocation", self.max_allocation),
            ("buy_increment", self.buy_increment),
            ("sell_decrement", self.sell_decrement),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return invalid(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if self.lot_size == 0 {
            return invalid("lot_size must be positive".into());
        }
        Ok(())
    }

    fn floor_to_lot(&self, shares: f64) -> u64 {
        let lots = (shares / self.lot_size as f64).floor();
        if lots > 0.0 {
            lots as u64 * self.lot_size
        } else {
            0
        }
    }
}

/// Inclusive date bounds for the simulated part of the series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacktestWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl BacktestWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        BacktestWindow { start, end }
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        BacktestWindow {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Index range of `bars` (time-ordered) falling inside the window.
    pub fn index_range(&self, bars: &[PriceBar]) -> Range<usize> {
        let first = bars.partition_point(|b| self.start.is_some_and(|s| b.date < s));
        let last = bars.partition_point(|b| self.end.is_none_or(|e| b.date <= e));
        first..last.max(first)
    }
}

/// End-of-day portfolio snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub date: NaiveDate,
    pub close: f64,
    pub cash: f64,
    pub shares: u64,
    pub holdings_value: f64,
    pub total_value: f64,
    pub commission_paid: f64,
    /// Trade actually executed today; Hold when a signal could not be acted on.
    pub executed: Signal,
}

impl PortfolioState {
    /// All-cash state standing in for "the day before" the first bar.
    pub fn opening(date: NaiveDate, capital: f64) -> Self {
        PortfolioState {
            date,
            close: 0.0,
            cash: capital,
            shares: 0,
            holdings_value: 0.0,
            total_value: capital,
            commission_paid: 0.0,
            executed: Signal::Hold,
        }
    }
}

/// Single-day state transition: carry `prev` forward, act on `signal` at the
/// close of `bar`, and mark to market.
pub fn step_day(
    prev: &PortfolioState,
    bar: &PriceBar,
    signal: Signal,
    config: &SizingConfig,
) -> PortfolioState {
    let price = bar.close;
    let prior_total = prev.total_value;
    let mut cash = prev.cash;
    let mut shares = prev.shares;
    let mut commission_paid = 0.0;
    let mut executed = Signal::Hold;

    match signal {
        Signal::Buy => {
            let position_value = shares as f64 * price;
            let max_position = prior_total * config.max_allocation;
            if position_value < max_position {
                let invest = (config.initial_capital * config.buy_increment)
                    .min(max_position - position_value)
                    .min(cash);
                if invest > 0.0 {
                    let to_buy = config.floor_to_lot(invest / price);
                    if to_buy > 0 {
                        let notional = to_buy as f64 * price;
                        let commission = notional * config.commission_rate;
                        let cost = notional + commission;
                        if cost <= cash {
                            cash -= cost;
                            shares += to_buy;
                            commission_paid += commission;
                            executed = Signal::Buy;
                            tracing::debug!(
                                date = %bar.date,
                                shares = to_buy,
                                price,
                                cost,
                                commission,
                                "buy"
                            );
                        }
                    }
                }
            }
        }
        Signal::Sell if shares > 0 => {
            let to_sell = sell_quantity(shares, config);
            if to_sell > 0 {
                let notional = to_sell as f64 * price;
                let commission = notional * config.commission_rate;
                let proceeds = notional - commission;
                cash += proceeds;
                shares -= to_sell;
                commission_paid += commission;
                executed = Signal::Sell;
                tracing::debug!(
                    date = %bar.date,
                    shares = to_sell,
                    price,
                    proceeds,
                    commission,
                    "sell"
                );
            }
        }
        _ => {}
    }

    let holdings_value = shares as f64 * price;
    PortfolioState {
        date: bar.date,
        close: price,
        cash,
        shares,
        holdings_value,
        total_value: cash + holdings_value,
        commission_paid,
        executed,
    }
}

fn sell_quantity(shares: u64, config: &SizingConfig) -> u64 {
    let raw = shares as f64 * config.sell_decrement;
    let mut to_sell = config.floor_to_lot(raw);
    if to_sell == 0 && raw > 0.0 {
        to_sell = if shares >= config.lot_size {
            config.lot_size
        } else {
            shares
        };
    }
    to_sell.min(shares)
}

/// Day-indexed portfolio states of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub states: Vec<PortfolioState>,
    pub initial_capital: f64,
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn final_value(&self) -> f64 {
        self.states
            .last()
            .map(|s| s.total_value)
            .unwrap_or(self.initial_capital)
    }

    pub fn total_values(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.total_value).collect()
    }

    /// Day-over-day change of total value; the first day is 0.
    pub fn returns(&self) -> Vec<f64> {
        daily_returns(&self.total_values())
    }

    /// Compounded growth since the first day, minus one.
    pub fn cumulative_returns(&self) -> Vec<f64> {
        let mut growth = 1.0;
        self.returns()
            .into_iter()
            .map(|r| {
                growth *= 1.0 + r;
                growth - 1.0
            })
            .collect()
    }

    pub fn total_commission(&self) -> f64 {
        self.states.iter().map(|s| s.commission_paid).sum()
    }
}

pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        if i == 0 || values[i - 1] == 0.0 {
            out.push(0.0);
        } else {
            out.push(v / values[i - 1] - 1.0);
        }
    }
    out
}

/// Simulate `signals` over the part of `bars` inside `window`.
///
/// `signals` must be parallel to the full `bars` slice so that signals can be
/// computed with their complete look-back before the window is applied.
pub fn run_backtest(
    bars: &[PriceBar],
    signals: &[Signal],
    config: &SizingConfig,
    window: &BacktestWindow,
) -> Result<Ledger, TraderError> {
    if bars.len() != signals.len() {
        return Err(TraderError::SignalLengthMismatch {
            bars: bars.len(),
            signals: signals.len(),
        });
    }
    config.validate()?;

    let range = window.index_range(bars);
    if range.is_empty() {
        return Err(TraderError::EmptyWindow);
    }

    let mut states: Vec<PortfolioState> = Vec::with_capacity(range.len());
    let mut prev = PortfolioState::opening(bars[range.start].date, config.initial_capital);
    for i in range {
        let state = step_day(&prev, &bars[i], signals[i], config);
        states.push(state.clone());
        prev = state;
    }

    Ok(Ledger {
        states,
        initial_capital: config.initial_capital,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bars_from(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000,
                turnover_rate: None,
            })
            .collect()
    }

    fn no_commission(capital: f64) -> SizingConfig {
        SizingConfig {
            initial_capital: capital,
            commission_rate: 0.0,
            ..SizingConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SizingConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_sizing() {
        let c = SizingConfig {
            lot_size: 0,
            ..SizingConfig::default()
        };
        assert!(c.validate().is_err());
        let c = SizingConfig {
            max_allocation: 1.5,
            ..SizingConfig::default()
        };
        assert!(c.validate().is_err());
        let c = SizingConfig {
            initial_capital: -1.0,
            ..SizingConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn forced_buy_then_sell_moves_cash_by_notional() {
        let bars = bars_from(&[10.0, 11.0, 9.0, 12.0]);
        let signals = [Signal::Hold, Signal::Buy, Signal::Sell, Signal::Hold];
        let ledger = run_backtest(
            &bars,
            &signals,
            &no_commission(10_000.0),
            &BacktestWindow::default(),
        )
        .unwrap();
        let s = &ledger.states;

        let bought = s[1].shares - s[0].shares;
        assert_eq!(bought, 100);
        assert_relative_eq!(s[0].cash - s[1].cash, 11.0 * bought as f64);

        let sold = s[1].shares - s[2].shares;
        assert_eq!(sold, 100);
        assert_relative_eq!(s[2].cash - s[1].cash, 9.0 * sold as f64);

        for st in s {
            assert_relative_eq!(st.total_value, st.cash + st.shares as f64 * st.close);
        }
        assert_eq!(s[1].executed, Signal::Buy);
        assert_eq!(s[2].executed, Signal::Sell);
        assert_relative_eq!(ledger.final_value(), 9_800.0);
    }

    #[test]
    fn buy_is_capped_by_allocation_room() {
        let bars = bars_from(&[10.0, 10.0, 10.0]);
        let config = SizingConfig {
            initial_capital: 10_000.0,
            commission_rate: 0.0,
            max_allocation: 0.5,
            buy_increment: 1.0,
            ..SizingConfig::default()
        };
        let signals = [Signal::Buy, Signal::Buy, Signal::Buy];
        let ledger = run_backtest(&bars, &signals, &config, &BacktestWindow::default()).unwrap();
        assert_eq!(ledger.states[0].shares, 500);
        // Position already at the cap: further buys are no-ops.
        assert_eq!(ledger.states[2].shares, 500);
        assert_eq!(ledger.states[1].executed, Signal::Hold);
    }

    #[test]
    fn buy_requires_cash_for_commission() {
        let bars = bars_from(&[10.0]);
        let config = SizingConfig {
            initial_capital: 1_000.0,
            commission_rate: 0.01,
            buy_increment: 1.0,
            ..SizingConfig::default()
        };
        // 1000 buys exactly one lot of 100 at 10, but the commission does not fit.
        let ledger =
            run_backtest(&bars, &[Signal::Buy], &config, &BacktestWindow::default()).unwrap();
        assert_eq!(ledger.states[0].shares, 0);
        assert_relative_eq!(ledger.states[0].cash, 1_000.0);
    }

    #[test]
    fn sell_fraction_below_one_lot_sells_one_lot() {
        let config = no_commission(100_000.0);
        let bar = &bars_from(&[10.0])[0];
        let prev = PortfolioState {
            shares: 100,
            cash: 0.0,
            total_value: 1_000.0,
            ..PortfolioState::opening(bar.date, 0.0)
        };
        let next = step_day(&prev, bar, Signal::Sell, &config);
        assert_eq!(next.shares, 0);
        assert_relative_eq!(next.cash, 1_000.0);
    }

    #[test]
    fn sell_odd_remainder_below_one_lot() {
        let config = no_commission(100_000.0);
        let bar = &bars_from(&[10.0])[0];
        let prev = PortfolioState {
            shares: 40,
            ..PortfolioState::opening(bar.date, 0.0)
        };
        let next = step_day(&prev, bar, Signal::Sell, &config);
        assert_eq!(next.shares, 0);
    }

    #[test]
    fn sell_half_rounds_down_to_lots() {
        let config = no_commission(100_000.0);
        let bar = &bars_from(&[10.0])[0];
        let prev = PortfolioState {
            shares: 700,
            ..PortfolioState::opening(bar.date, 0.0)
        };
        let next = step_day(&prev, bar, Signal::Sell, &config);
        assert_eq!(next.shares, 400);
        assert_eq!(next.executed, Signal::Sell);
    }

    #[test]
    fn sell_without_position_is_noop() {
        let config = SizingConfig::default();
        let bar = &bars_from(&[10.0])[0];
        let prev = PortfolioState::opening(bar.date, 5_000.0);
        let next = step_day(&prev, bar, Signal::Sell, &config);
        assert_eq!(next.executed, Signal::Hold);
        assert_relative_eq!(next.cash, 5_000.0);
    }

    #[test]
    fn commission_is_recorded_per_day() {
        let bars = bars_from(&[10.0, 10.0]);
        let config = SizingConfig {
            initial_capital: 10_000.0,
            commission_rate: 0.001,
            buy_increment: 0.5,
            ..SizingConfig::default()
        };
        let ledger = run_backtest(
            &bars,
            &[Signal::Buy, Signal::Hold],
            &config,
            &BacktestWindow::default(),
        )
        .unwrap();
        assert_relative_eq!(ledger.states[0].commission_paid, 5.0);
        assert_relative_eq!(ledger.states[1].commission_paid, 0.0);
        assert_relative_eq!(ledger.total_commission(), 5.0);
    }

    #[test]
    fn window_limits_simulated_days() {
        let bars = bars_from(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let signals = vec![Signal::Hold; 5];
        let window = BacktestWindow::between(bars[1].date, bars[3].date);
        let ledger =
            run_backtest(&bars, &signals, &SizingConfig::default(), &window).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.states[0].date, bars[1].date);
        assert_eq!(ledger.states[2].date, bars[3].date);
    }

    #[test]
    fn empty_window_is_an_error() {
        let bars = bars_from(&[10.0, 11.0]);
        let after = bars[1].date + chrono::Duration::days(10);
        let window = BacktestWindow::new(Some(after), None);
        let err = run_backtest(&bars, &[Signal::Hold; 2], &SizingConfig::default(), &window)
            .unwrap_err();
        assert!(matches!(err, TraderError::EmptyWindow));
    }

    #[test]
    fn mismatched_signals_rejected() {
        let bars = bars_from(&[10.0, 11.0]);
        let err = run_backtest(
            &bars,
            &[Signal::Hold],
            &SizingConfig::default(),
            &BacktestWindow::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TraderError::SignalLengthMismatch {
                bars: 2,
                signals: 1
            }
        ));
    }

    #[test]
    fn returns_and_cumulative_returns() {
        let ledger = Ledger {
            states: [10_000.0, 11_000.0, 9_900.0]
                .iter()
                .enumerate()
                .map(|(i, &v)| PortfolioState {
                    total_value: v,
                    cash: v,
                    ..PortfolioState::opening(
                        NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap(),
                        v,
                    )
                })
                .collect(),
            initial_capital: 10_000.0,
        };
        let r = ledger.returns();
        assert_eq!(r[0], 0.0);
        assert_relative_eq!(r[1], 0.1, epsilon = 1e-12);
        assert_relative_eq!(r[2], -0.1, epsilon = 1e-12);
        let c = ledger.cumulative_returns();
        assert_relative_eq!(c[2], -0.01, epsilon = 1e-12);
    }
}
