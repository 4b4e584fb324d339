//! Domain error types.

/// Top-level error type for etftrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid strategy parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("bar series not strictly ordered at {date}")]
    UnorderedSeries { date: chrono::NaiveDate },

    #[error("invalid bar on {date}: {reason}")]
    InvalidBar {
        date: chrono::NaiveDate,
        reason: String,
    },

    #[error("unparseable date '{value}'")]
    InvalidDate { value: String },

    #[error("signal series has {signals} entries for {bars} bars")]
    SignalLengthMismatch { bars: usize, signals: usize },

    #[error("backtest window selects no bars")]
    EmptyWindow,

    #[error("optimizer error: {reason}")]
    Optimizer { reason: String },

    #[error("{failed} candidate evaluations failed (first: {first})")]
    CandidateFailures { failed: usize, first: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    /// Errors caused by a missing or malformed price history.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            TraderError::MissingColumn { .. }
                | TraderError::NoData { .. }
                | TraderError::InsufficientData { .. }
                | TraderError::UnorderedSeries { .. }
                | TraderError::InvalidBar { .. }
                | TraderError::InvalidDate { .. }
                | TraderError::SignalLengthMismatch { .. }
                | TraderError::EmptyWindow
        )
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) | TraderError::Csv(_) | TraderError::Json(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::InvalidParameters { .. } => 3,
            e if e.is_data_error() => 5,
            _ => 6,
        };
        std::process::ExitCode::from(code)
    }
}
