//! Saturating (Hill-type) response curve: evaluation, adstock carryover and fitting.

mod error;
mod fit;
mod hill;

pub use error::FitError;
pub use fit::{fit, FitOptions};
pub use hill::{apply_adstock, evaluate, evaluate_adstocked, predict_history, prior_adstock_state};
