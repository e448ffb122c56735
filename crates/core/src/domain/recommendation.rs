use crate::domain::{DataQualityState, ScenarioAction, TrafficLight};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPlan {
    pub scenario_name: String,
    pub recommendations: Vec<ScenarioRecommendation>,
    pub projected_summary: ProjectedSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecommendation {
    pub channel_name: String,
    pub action: ScenarioAction,
    pub rationale: String,
    pub current_spend: f64,
    pub recommended_spend: f64,
    pub spend_delta: f64,
    pub spend_delta_percent: f64,
    pub current_marginal_cpa: Option<f64>,
    pub projected_marginal_cpa: Option<f64>,
    pub target_cpa: f64,
    pub traffic_light: TrafficLight,
    pub locked: bool,
    pub data_quality_state: DataQualityState,
    pub data_quality_reason: Option<String>,
    pub is_action_blocked: bool,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedSummary {
    pub current_total_spend: f64,
    pub projected_total_spend: f64,
    pub total_spend_delta: f64,
    pub total_spend_delta_percent: f64,
    /// Net change the request asked for; differs from `total_spend_delta` when infeasible.
    pub requested_spend_delta: f64,
    pub channels_increase: usize,
    pub channels_decrease: usize,
    pub channels_maintain: usize,
    pub channels_locked: usize,
    pub channels_insufficient_data: usize,
}

impl ScenarioPlan {
    pub fn recommendation(&self, channel_name: &str) -> Option<&ScenarioRecommendation> {
        self.recommendations.iter().find(|r| r.channel_name == channel_name)
    }
}
