//! CSV file data adapter.
//!
//! Expects one daily file per symbol at `<base>/<symbol>/<symbol>_Day.csv`
//! (or flat at `<base>/<symbol>_Day.csv`). Columns are matched by header
//! name, accepting both the exporter's names and plain lowercase ones.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::{sort_and_dedup, PriceBar};
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

const DATE: &[&str] = &["DateTime", "date"];
const OPEN: &[&str] = &["OpenValue", "open"];
const HIGH: &[&str] = &["HighValue", "high"];
const LOW: &[&str] = &["LowValue", "low"];
const CLOSE: &[&str] = &["CloseValue", "close"];
const VOLUME: &[&str] = &["Volume", "volume"];
const TURNOVER: &[&str] = &["ChangeRate", "turnover_rate"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    turnover: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, TraderError> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| {
                    let h = h.trim_start_matches('\u{feff}').trim();
                    aliases.iter().any(|a| h.eq_ignore_ascii_case(a))
                })
        };
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| TraderError::MissingColumn {
                column: aliases[0].to_string(),
            })
        };
        Ok(Columns {
            date: require(DATE)?,
            open: require(OPEN)?,
            high: require(HIGH)?,
            low: require(LOW)?,
            close: require(CLOSE)?,
            volume: require(VOLUME)?,
            turnover: find(TURNOVER),
        })
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Path of the daily file for `symbol`, preferring the per-symbol folder.
    pub fn csv_path(&self, symbol: &str) -> PathBuf {
        let nested = self
            .base_path
            .join(symbol)
            .join(format!("{symbol}_Day.csv"));
        if nested.exists() {
            return nested;
        }
        self.base_path.join(format!("{symbol}_Day.csv"))
    }

    pub fn read_file(path: &Path) -> Result<Vec<PriceBar>, TraderError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let columns = Columns::from_headers(rdr.headers()?)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

            let date = parse_date(field(columns.date))?;
            let prices = [
                field(columns.open),
                field(columns.high),
                field(columns.low),
                field(columns.close),
            ];
            if prices.iter().any(|p| p.is_empty()) {
                continue;
            }
            let [open, high, low, close] = prices;

            let volume = match field(columns.volume) {
                "" => 0,
                v => parse_number(v, date, "volume")?.max(0.0).round() as u64,
            };
            let turnover_rate = match columns.turnover.map(field) {
                None | Some("") => None,
                Some(v) => Some(parse_number(v, date, "turnover rate")?),
            };

            bars.push(PriceBar {
                date,
                open: parse_number(open, date, "open")?,
                high: parse_number(high, date, "high")?,
                low: parse_number(low, date, "low")?,
                close: parse_number(close, date, "close")?,
                volume,
                turnover_rate,
            });
        }

        Ok(sort_and_dedup(bars))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, TraderError> {
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(date);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(dt.date());
        }
    }
    Err(TraderError::InvalidDate {
        value: value.to_string(),
    })
}

fn parse_number(value: &str, date: NaiveDate, what: &str) -> Result<f64, TraderError> {
    value.parse::<f64>().map_err(|e| TraderError::InvalidBar {
        date,
        reason: format!("invalid {what} '{value}': {e}"),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<PriceBar>, TraderError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        let bars = Self::read_file(&path)?;
        if bars.is_empty() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        tracing::debug!(symbol, path = %path.display(), bars = bars.len(), "loaded daily bars");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const EXPORT: &str = "DateTime,OpenValue,HighValue,LowValue,CloseValue,Volume,ChangeRate\n\
        2024-01-16,1.05,1.15,1.00,1.10,60000,0.8\n\
        2024-01-15,1.00,1.10,0.90,1.05,50000,0.5\n\
        2024-01-17,1.10,1.20,1.05,1.15,55000,\n";

    fn setup() -> (TempDir, CsvAdapter) {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("510300");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("510300_Day.csv"), EXPORT).unwrap();
        fs::write(
            dir.path().join("159915_Day.csv"),
            "date,open,high,low,close,volume\n\
             2024-02-01 00:00:00,2.0,2.1,1.9,2.05,1000.0\n\
             2024-02-01 00:00:00,2.0,2.1,1.9,2.07,1200.0\n\
             2024-02-02 00:00:00,2.1,2.2,2.0,,1100\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("588000_Day.csv"),
            "DateTime,OpenValue,HighValue,LowValue,Volume\n2024-01-15,1,1,1,100\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        (dir, adapter)
    }

    #[test]
    fn reads_exporter_columns_in_date_order() {
        let (_dir, adapter) = setup();
        let bars = adapter.fetch_bars("510300").unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(bars[0].close, 1.05);
        assert_eq!(bars[0].volume, 50000);
        assert_eq!(bars[0].turnover_rate, Some(0.5));
        assert_eq!(bars[2].turnover_rate, None);
    }

    #[test]
    fn lowercase_headers_datetimes_and_duplicates() {
        let (_dir, adapter) = setup();
        let bars = adapter.fetch_bars("159915").unwrap();
        // Duplicate date keeps the last row; the blank close row is dropped.
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 2.07);
        assert_eq!(bars[0].volume, 1200);
    }

    #[test]
    fn missing_close_column_is_reported() {
        let (_dir, adapter) = setup();
        let err = adapter.fetch_bars("588000").unwrap_err();
        assert!(matches!(err, TraderError::MissingColumn { ref column } if column == "CloseValue"));
        assert!(err.is_data_error());
    }

    #[test]
    fn unknown_symbol_has_no_data() {
        let (_dir, adapter) = setup();
        assert!(matches!(
            adapter.fetch_bars("000000"),
            Err(TraderError::NoData { .. })
        ));
        assert_eq!(adapter.data_range("000000").unwrap(), None);
    }

    #[test]
    fn data_range_reports_bounds() {
        let (_dir, adapter) = setup();
        let (first, last, count) = adapter.data_range("510300").unwrap().unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
        assert_eq!(count, 3);
    }

    #[test]
    fn invalid_number_names_the_field() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("X_Day.csv"),
            "date,open,high,low,close,volume\n2024-01-15,abc,1,1,1,100\n",
        )
        .unwrap();
        let err = CsvAdapter::new(dir.path().to_path_buf())
            .fetch_bars("X")
            .unwrap_err();
        assert!(err.to_string().contains("invalid open"));
    }
}
