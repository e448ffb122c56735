use crate::domain::{DataQualityState, FittedModel};
use crate::quality::{self, DataQualityAssessment};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Per-channel input to the scenario engine.
///
/// The data-quality assessment is computed from `(history_days, model)` at construction
/// and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub channel_name: String,
    pub current_spend: f64,
    pub target_cpa: f64,
    pub model: Option<FittedModel>,
    pub history_days: u32,
    /// Adstock carried into the current day; zero when the model has no carryover.
    pub prior_adstock_state: f64,
    data_quality: DataQualityAssessment,
}

impl ChannelSnapshot {
    pub fn new(
        channel_name: impl Into<String>,
        current_spend: f64,
        target_cpa: f64,
        model: Option<FittedModel>,
        history_days: u32,
    ) -> anyhow::Result<Self> {
        let channel_name = channel_name.into().trim().to_string();
        ensure!(!channel_name.is_empty(), "channel_name must be non-empty");
        ensure!(
            current_spend.is_finite() && current_spend >= 0.0,
            "current_spend for {channel_name} must be >= 0 (got {current_spend})"
        );
        ensure!(
            target_cpa.is_finite() && target_cpa > 0.0,
            "target_cpa for {channel_name} must be > 0 (got {target_cpa})"
        );

        let data_quality = quality::assess(history_days, model.as_ref());
        Ok(Self {
            channel_name,
            current_spend,
            target_cpa,
            model,
            history_days,
            prior_adstock_state: 0.0,
            data_quality,
        })
    }

    pub fn with_prior_adstock_state(mut self, state: f64) -> Self {
        self.prior_adstock_state = if state.is_finite() { state.max(0.0) } else { 0.0 };
        self
    }

    pub fn data_quality(&self) -> &DataQualityAssessment {
        &self.data_quality
    }

    pub fn data_quality_state(&self) -> DataQualityState {
        self.data_quality.state
    }

    pub fn key(&self) -> String {
        channel_key(&self.channel_name)
    }
}

/// Normalized lookup key used for locks and target overrides.
pub fn channel_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Channel,
    Campaign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOverride {
    #[serde(default)]
    pub entity_type: EntityType,
    pub entity_key: String,
    pub target_cpa: f64,
}

impl TargetOverride {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.entity_key.trim().is_empty(),
            "target override entity_key must be non-empty"
        );
        ensure!(
            self.target_cpa.is_finite() && self.target_cpa > 0.0,
            "target override for {} must be > 0 (got {})",
            self.entity_key,
            self.target_cpa
        );
        Ok(())
    }

    pub fn applies_to_channel(&self, channel_name: &str) -> bool {
        self.entity_type == EntityType::Channel && channel_key(&self.entity_key) == channel_key(channel_name)
    }
}

/// Effective target for a channel: the last matching channel override, else `default`.
pub fn resolve_target(channel_name: &str, default: f64, overrides: &[TargetOverride]) -> (f64, crate::domain::TargetSource) {
    overrides
        .iter()
        .rev()
        .find(|o| o.applies_to_channel(channel_name))
        .map(|o| (o.target_cpa, crate::domain::TargetSource::Override))
        .unwrap_or((default, crate::domain::TargetSource::Default))
}
