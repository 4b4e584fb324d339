//! Configuration validation.
//!
//! Checks every section a run reads before any data is loaded, so a bad key
//! is reported as a config error instead of surfacing mid-run.

use crate::domain::error::TraderError;
use crate::domain::optimizer::FailurePolicy;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

const STRATEGY_WINDOWS: [&str; 4] = ["short_window", "long_window", "volume_window", "rsi_period"];
const STRATEGY_REALS: [&str; 5] = [
    "volume_surge_multiplier",
    "volume_sell_multiplier",
    "rsi_oversold",
    "rsi_surge_multiplier",
    "divergence_threshold",
];

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Section holding `key` for `symbol`: `strategy.<SYMBOL>` when it sets the
/// key, otherwise the shared `strategy` section.
pub fn strategy_section(config: &dyn ConfigPort, symbol: Option<&str>, key: &str) -> String {
    if let Some(symbol) = symbol {
        let section = format!("strategy.{symbol}");
        if config.has_key(&section, key) {
            return section;
        }
    }
    "strategy".to_string()
}

/// Parse an optional key, failing on a present but malformed value.
pub fn parse_optional<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, TraderError>
where
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, format!("cannot parse '{raw}': {e}"))),
    }
}

pub fn parse_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDate>, TraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}

pub fn validate_data_config(config: &dyn ConfigPort, symbol: Option<&str>) -> Result<(), TraderError> {
    if config.get_string("data", "dir").is_none() {
        return Err(TraderError::ConfigMissing {
            section: "data".into(),
            key: "dir".into(),
        });
    }
    if symbol.is_none() && config.get_string("data", "symbol").is_none() {
        return Err(TraderError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        });
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let capital = config.get_double("backtest", "initial_capital", 100_000.0);
    if capital <= 0.0 {
        return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
    }

    let commission = config.get_double("backtest", "commission_rate", 0.0003);
    if !(0.0..1.0).contains(&commission) {
        return Err(invalid(
            "backtest",
            "commission_rate",
            "commission_rate must be in [0, 1)",
        ));
    }

    for key in ["max_allocation", "buy_increment", "sell_decrement"] {
        validate_fraction(config, "backtest", key, 0.5)?;
    }

    if config.get_int("backtest", "lot_size", 100) < 1 {
        return Err(invalid("backtest", "lot_size", "lot_size must be at least 1"));
    }

    let start = parse_date(config, "backtest", "start_date")?;
    let end = parse_date(config, "backtest", "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok(())
}

/// Fractions in (0, 1]; `fallback` only stands in for an absent key.
fn validate_fraction(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    fallback: f64,
) -> Result<(), TraderError> {
    let value = config.get_double(section, key, fallback);
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(section, key, format!("{key} must be in (0, 1], got {value}")));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort, symbol: Option<&str>) -> Result<(), TraderError> {
    for key in STRATEGY_WINDOWS {
        let section = strategy_section(config, symbol, key);
        if config.get_int(&section, key, 1) < 1 {
            return Err(invalid(&section, key, format!("{key} must be a positive integer")));
        }
    }
    for key in STRATEGY_REALS {
        let section = strategy_section(config, symbol, key);
        let value = config.get_double(&section, key, 1.0);
        if value <= 0.0 {
            return Err(invalid(&section, key, format!("{key} must be positive")));
        }
    }

    let short_section = strategy_section(config, symbol, "short_window");
    let long_section = strategy_section(config, symbol, "long_window");
    let short = config.get_int(&short_section, "short_window", 5);
    let long = config.get_int(&long_section, "long_window", 16);
    if short >= long {
        return Err(invalid(
            &short_section,
            "short_window",
            format!("short_window ({short}) must be less than long_window ({long})"),
        ));
    }
    Ok(())
}

pub fn validate_optimizer_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let section = "optimizer";

    for (key, minimum) in [
        ("phase1_samples", 1),
        ("phase2_samples", 0),
        ("top_k", 1),
        ("min_train_trades", 0),
        ("min_bars", 1),
    ] {
        if config.get_int(section, key, minimum) < minimum {
            return Err(invalid(section, key, format!("{key} must be at least {minimum}")));
        }
    }

    let jitter = config.get_double(section, "jitter_pct", 0.10);
    if !(0.0..1.0).contains(&jitter) {
        return Err(invalid(section, "jitter_pct", "jitter_pct must be in [0, 1)"));
    }
    let train_ratio = config.get_double(section, "train_ratio", 0.7);
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(invalid(section, "train_ratio", "train_ratio must be in (0, 1)"));
    }
    let weight = config.get_double(section, "validation_weight", 0.7);
    if !(0.0..=1.0).contains(&weight) {
        return Err(invalid(
            section,
            "validation_weight",
            "validation_weight must be in [0, 1]",
        ));
    }
    validate_fraction(config, section, "max_train_drawdown", 0.20)?;
    validate_fraction(config, section, "buy_increment", 1.0)?;
    validate_fraction(config, section, "sell_decrement", 1.0)?;

    if config.get_double(section, "initial_capital", 10_000.0) <= 0.0 {
        return Err(invalid(section, "initial_capital", "initial_capital must be positive"));
    }

    parse_optional::<u64>(config, section, "seed")?;
    if parse_optional::<usize>(config, section, "workers")? == Some(0) {
        return Err(invalid(section, "workers", "workers must be at least 1"));
    }
    parse_optional::<FailurePolicy>(config, section, "failure_policy")?;
    Ok(())
}
