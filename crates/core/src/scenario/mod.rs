//! Budget-constrained reallocation of spend across channels.

mod engine;
mod rationale;

pub use engine::{recommend, MAX_STEPS, SPEND_TOLERANCE};

use crate::domain::TargetOverride;
use serde::{Deserialize, Serialize};

/// Scenario knobs that apply across all channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    /// Derived from the budget delta when absent.
    pub scenario_name: Option<String>,
    /// Percent change applied to the current total spend across all channels.
    pub budget_delta_percent: f64,
    pub locked_channels: Vec<String>,
    pub target_cpa_overrides: Vec<TargetOverride>,
}

impl ScenarioRequest {
    pub fn resolved_name(&self) -> String {
        match &self.scenario_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("Auto Scenario ({:+.1}% budget)", self.budget_delta_percent),
        }
    }
}
