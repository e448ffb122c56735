use std::fmt;

/// Why a response curve could not be produced for a channel.
///
/// None of these are retried automatically; a new fit is attempted only when new data arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    InsufficientHistory { days: usize, required: usize },
    FitFailed { reason: String },
    DegenerateInput { reason: String },
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory { days, required } => {
                write!(f, "insufficient_history: {days} days < {required} required")
            }
            Self::FitFailed { reason } => write!(f, "fit_failed: {reason}"),
            Self::DegenerateInput { reason } => write!(f, "degenerate_input: {reason}"),
        }
    }
}

impl std::error::Error for FitError {}
