//! Domain error types.

/// Top-level error type for tradeflow.
#[derive(Debug, thiserror::Error)]
pub enum TradeflowError {
    #[error("time-series source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("aggregate store unavailable: {reason}")]
    PersistenceUnavailable { reason: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

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

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradeflowError {
    pub fn source_unavailable(reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            reason: reason.to_string(),
        }
    }

    pub fn persistence_unavailable(reason: impl ToString) -> Self {
        Self::PersistenceUnavailable {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}

impl From<&TradeflowError> for std::process::ExitCode {
    fn from(err: &TradeflowError) -> Self {
        let code: u8 = match err {
            TradeflowError::Io(_) | TradeflowError::Csv(_) => 1,
            TradeflowError::ConfigParse { .. }
            | TradeflowError::ConfigMissing { .. }
            | TradeflowError::ConfigInvalid { .. } => 2,
            TradeflowError::SourceUnavailable { .. } => 3,
            TradeflowError::PersistenceUnavailable { .. } => 4,
            TradeflowError::InvalidInput { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
