use serde::{Deserialize, Serialize};

/// Common error type for controller operations.
///
/// Every variant is reportable through the status surface; none of them leaves
/// the controller unusable.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VizError {
    #[error("invalid server payload: {0}")]
    InvalidPayload(String),
    #[error("no data for timestamp {0}")]
    NoDataForTimestamp(String),
    #[error("no heatmap images returned from server")]
    EmptyImageSet,
    #[error("no timestamps available, generate a heatmap first")]
    NoTimestamps,
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("cancelled by user")]
    UserCancelled,
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("session storage failure: {0}")]
    Storage(String),
    #[error("decode failure: {0}")]
    Decode(String),
}

impl VizError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn network(msg: impl std::fmt::Display) -> Self {
        Self::NetworkFailure(msg.to_string())
    }

    /// Severity used when the error is shown on the status surface.
    /// `None` means the error is swallowed silently.
    pub fn level(&self) -> Option<StatusLevel> {
        match self {
            VizError::NoDataForTimestamp(_) | VizError::EmptyImageSet | VizError::NoTimestamps => {
                Some(StatusLevel::Info)
            }
            VizError::UserCancelled => None,
            _ => Some(StatusLevel::Error),
        }
    }

    /// Text shown to the user for this error.
    pub fn status_text(&self) -> String {
        match self {
            VizError::NetworkFailure(msg) => {
                format!("Network error: {msg}. Check the connection and try again.")
            }
            other => format!("{other}"),
        }
    }

    pub fn is_informational(&self) -> bool {
        matches!(self.level(), Some(StatusLevel::Info))
    }
}

pub type VizResult<T> = Result<T, VizError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// Content of the single transient status line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn from_error(err: &VizError) -> Option<Self> {
        err.level().map(|level| Self::new(level, err.status_text()))
    }
}
