//! Property tests for signal and ledger invariants over random series.

mod common;

use common::*;
use etftrader::domain::backtest::{run_backtest, BacktestWindow, SizingConfig};
use etftrader::domain::params::{ParameterFields, StrategyParameters};
use etftrader::domain::signal::{generate_signals, Signal};
use proptest::prelude::*;

fn series() -> impl Strategy<Value = Vec<PriceBar>> {
    (40usize..160).prop_flat_map(|n| {
        (
            prop::collection::vec(1.0f64..200.0, n),
            prop::collection::vec(100u64..5_000_000, n),
        )
            .prop_map(|(closes, volumes)| bars_from(&closes, &volumes))
    })
}

fn params() -> impl Strategy<Value = StrategyParameters> {
    (
        1usize..8,
        1usize..20,
        1usize..20,
        2usize..20,
        0.5f64..2.0,
        1.0f64..6.0,
        10.0f64..50.0,
        0.5f64..2.5,
        0.001f64..0.1,
    )
        .prop_map(
            |(short, extra, volume_window, rsi_period, surge, sell, oversold, rsi_surge, div)| {
                StrategyParameters::new(ParameterFields {
                    short_window: short,
                    long_window: short + extra,
                    volume_window,
                    volume_surge_multiplier: surge,
                    volume_sell_multiplier: sell,
                    rsi_period,
                    rsi_oversold: oversold,
                    rsi_surge_multiplier: rsi_surge,
                    divergence_threshold: div,
                })
                .unwrap()
            },
        )
}

fn sizing() -> impl Strategy<Value = SizingConfig> {
    (
        1_000.0f64..500_000.0,
        0.0f64..0.01,
        0.1f64..=1.0,
        0.05f64..=1.0,
        0.05f64..=1.0,
        prop::sample::select(vec![1u64, 10, 100]),
    )
        .prop_map(
            |(initial_capital, commission_rate, max_allocation, buy_increment, sell_decrement, lot_size)| {
                SizingConfig {
                    initial_capital,
                    commission_rate,
                    max_allocation,
                    buy_increment,
                    sell_decrement,
                    lot_size,
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn warmup_bars_are_hold(bars in series(), params in params()) {
        let signals = generate_signals(&bars, &params).unwrap();
        prop_assert_eq!(signals.len(), bars.len());
        for signal in &signals[..params.short_window()] {
            prop_assert_eq!(*signal, Signal::Hold);
        }
    }

    #[test]
    fn ledger_invariants_hold(bars in series(), params in params(), sizing in sizing()) {
        let signals = generate_signals(&bars, &params).unwrap();
        let ledger = run_backtest(&bars, &signals, &sizing, &BacktestWindow::default()).unwrap();
        prop_assert_eq!(ledger.len(), bars.len());

        let mut prior_total = sizing.initial_capital;
        let mut prior_shares = 0u64;
        for state in &ledger.states {
            let marked = state.cash + state.shares as f64 * state.close;
            prop_assert!((state.total_value - marked).abs() <= 1e-9 * state.total_value.max(1.0));
            prop_assert!(state.cash >= -1e-9);
            prop_assert_eq!(state.shares % sizing.lot_size, 0);

            if state.executed == Signal::Buy {
                prop_assert!(state.shares > prior_shares);
                let slack = sizing.lot_size as f64 * state.close;
                prop_assert!(
                    state.holdings_value <= sizing.max_allocation * prior_total + slack + 1e-6
                );
            }
            prior_total = state.total_value;
            prior_shares = state.shares;
        }
    }

    #[test]
    fn pipeline_is_deterministic(bars in series(), params in params(), sizing in sizing()) {
        let first = generate_signals(&bars, &params).unwrap();
        let second = generate_signals(&bars, &params).unwrap();
        prop_assert_eq!(&first, &second);

        let window = BacktestWindow::default();
        let a = run_backtest(&bars, &first, &sizing, &window).unwrap();
        let b = run_backtest(&bars, &second, &sizing, &window).unwrap();
        prop_assert_eq!(a, b);
    }
}
