//! Decides whether a channel's response curve is trustworthy enough to act on.

use crate::domain::{ConfidenceTier, DataQualityState, FittedModel};
use serde::{Deserialize, Serialize};

/// Minimum number of distinct observation days before a curve may be fit.
pub const MIN_HISTORY_DAYS: u32 = 21;

/// Fits below this R² are treated as low confidence.
pub const MIN_CONFIDENCE_R_SQUARED: f64 = 0.65;

const HIGH_CONFIDENCE_R_SQUARED: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityAssessment {
    pub state: DataQualityState,
    pub reason: Option<String>,
}

impl DataQualityAssessment {
    fn ok() -> Self {
        Self {
            state: DataQualityState::Ok,
            reason: None,
        }
    }
}

/// Total function from `(history_days, model)` to a quality state.
///
/// Enough history with no model means the fit itself failed; that channel is
/// `low_confidence` rather than `ok`.
pub fn assess(history_days: u32, model: Option<&FittedModel>) -> DataQualityAssessment {
    if history_days < MIN_HISTORY_DAYS {
        return DataQualityAssessment {
            state: DataQualityState::InsufficientHistory,
            reason: Some(format!(
                "Only {history_days} days of history; {MIN_HISTORY_DAYS} required to fit a response curve."
            )),
        };
    }

    match model {
        None => DataQualityAssessment {
            state: DataQualityState::LowConfidence,
            reason: Some("No response curve could be fit to this channel's history.".to_string()),
        },
        Some(m) if m.r_squared() < MIN_CONFIDENCE_R_SQUARED => DataQualityAssessment {
            state: DataQualityState::LowConfidence,
            reason: Some(format!(
                "Model fit R² {:.3} is below policy threshold {:.3}.",
                m.r_squared(),
                MIN_CONFIDENCE_R_SQUARED
            )),
        },
        Some(_) => DataQualityAssessment::ok(),
    }
}

/// Display-only tier derived from R².
pub fn confidence_tier(model: Option<&FittedModel>) -> ConfidenceTier {
    match model.map(FittedModel::r_squared) {
        None => ConfidenceTier::Unknown,
        Some(r2) if r2 >= HIGH_CONFIDENCE_R_SQUARED => ConfidenceTier::High,
        Some(r2) if r2 >= MIN_CONFIDENCE_R_SQUARED => ConfidenceTier::Medium,
        Some(_) => ConfidenceTier::Low,
    }
}
