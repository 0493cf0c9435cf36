use thiserror::Error;

use logsift_types::Source;

/// Errors raised while configuring or running an analysis
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("cannot read {input}: {reason}")]
    SourceUnreadable { input: Source, reason: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid timestamp format '{format}'")]
    InvalidTimestampFormat { format: String },

    #[error("invalid time bound '{value}': expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD'")]
    InvalidTimeBound { value: String },

    #[error("time range is empty: since {since} is after until {until}")]
    InvalidTimeRange { since: String, until: String },
}

impl AnalyzeError {
    pub(crate) fn unreadable(input: &Source, err: impl std::fmt::Display) -> Self {
        Self::SourceUnreadable {
            input: input.clone(),
            reason: err.to_string(),
        }
    }
}
