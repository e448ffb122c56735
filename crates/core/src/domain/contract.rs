//! Wire-level request shapes and their validation into domain types.

use crate::analysis::AnalysisSettings;
use crate::curve::FitOptions;
use crate::domain::snapshot::channel_key;
use crate::domain::{ChannelSnapshot, FittedModel, ModelParams, Observation, TargetOverride};
use crate::scenario::ScenarioRequest;
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_TARGET_CPA: f64 = 50.0;

fn default_target_cpa() -> f64 {
    DEFAULT_TARGET_CPA
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshotInput {
    pub channel_name: String,
    pub current_spend: f64,
    #[serde(default)]
    pub target_cpa: Option<f64>,
    #[serde(default)]
    pub model_params: Option<ModelParams>,
    pub history_days: u32,
    #[serde(default)]
    pub prior_adstock_state: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRequestInput {
    #[serde(default = "default_target_cpa")]
    pub target_cpa: f64,
    #[serde(default)]
    pub budget_delta_percent: f64,
    #[serde(default)]
    pub locked_channels: Vec<String>,
    #[serde(default)]
    pub target_cpa_overrides: Vec<TargetOverride>,
    #[serde(default)]
    pub scenario_name: Option<String>,
    pub channels: Vec<ChannelSnapshotInput>,
}

impl ScenarioRequestInput {
    pub fn validate_and_into_parts(self) -> anyhow::Result<(Vec<ChannelSnapshot>, ScenarioRequest)> {
        ensure!(
            self.target_cpa.is_finite() && self.target_cpa > 0.0,
            "target_cpa must be > 0 (got {})",
            self.target_cpa
        );
        ensure!(
            self.budget_delta_percent.is_finite(),
            "budget_delta_percent must be finite"
        );
        for o in &self.target_cpa_overrides {
            o.validate()?;
        }

        let mut seen = BTreeSet::new();
        let mut snapshots = Vec::with_capacity(self.channels.len());
        for input in self.channels {
            let snapshot = input.validate_and_into_snapshot(self.target_cpa)?;
            ensure!(
                seen.insert(snapshot.key()),
                "duplicate channel: {}",
                snapshot.channel_name
            );
            snapshots.push(snapshot);
        }

        let scenario_name = self
            .scenario_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok((
            snapshots,
            ScenarioRequest {
                scenario_name,
                budget_delta_percent: self.budget_delta_percent,
                locked_channels: self.locked_channels,
                target_cpa_overrides: self.target_cpa_overrides,
            },
        ))
    }
}

impl ChannelSnapshotInput {
    fn validate_and_into_snapshot(self, default_target_cpa: f64) -> anyhow::Result<ChannelSnapshot> {
        let model = self
            .model_params
            .map(FittedModel::try_from)
            .transpose()
            .with_context(|| format!("invalid model_params for channel {}", self.channel_name))?;

        let snapshot = ChannelSnapshot::new(
            self.channel_name,
            self.current_spend,
            self.target_cpa.unwrap_or(default_target_cpa),
            model,
            self.history_days,
        )?;

        Ok(match self.prior_adstock_state {
            Some(state) => snapshot.with_prior_adstock_state(state),
            None => snapshot,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHistoryInput {
    pub channel_name: String,
    /// Defaults to the latest day's spend in `series`.
    #[serde(default)]
    pub current_spend: Option<f64>,
    pub series: Vec<Observation>,
}

/// `target_cpa` falls back to the deployment default when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequestInput {
    #[serde(default)]
    pub target_cpa: Option<f64>,
    #[serde(default)]
    pub target_cpa_overrides: Vec<TargetOverride>,
    pub channels: Vec<ChannelHistoryInput>,
}

fn ensure_target(target_cpa: Option<f64>) -> anyhow::Result<()> {
    if let Some(t) = target_cpa {
        ensure!(t.is_finite() && t > 0.0, "target_cpa must be > 0 (got {t})");
    }
    Ok(())
}

impl AnalysisRequestInput {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure_target(self.target_cpa)?;
        ensure!(!self.channels.is_empty(), "channels must be non-empty");
        for o in &self.target_cpa_overrides {
            o.validate()?;
        }

        let mut seen = BTreeSet::new();
        for channel in &self.channels {
            channel.validate()?;
            ensure!(
                seen.insert(channel_key(&channel.channel_name)),
                "duplicate channel: {}",
                channel.channel_name.trim()
            );
        }
        Ok(())
    }

    pub fn validate_and_into_parts(
        self,
        default_target_cpa: f64,
        fit: FitOptions,
    ) -> anyhow::Result<(Vec<ChannelHistoryInput>, AnalysisSettings)> {
        self.validate()?;
        Ok((
            self.channels,
            AnalysisSettings {
                default_target_cpa: self.target_cpa.unwrap_or(default_target_cpa),
                target_cpa_overrides: self.target_cpa_overrides,
                fit,
                as_of: None,
            },
        ))
    }
}

impl ChannelHistoryInput {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.channel_name.trim().is_empty(),
            "channel_name must be non-empty"
        );
        if let Some(spend) = self.current_spend {
            ensure!(
                spend.is_finite() && spend >= 0.0,
                "current_spend for {} must be >= 0 (got {spend})",
                self.channel_name.trim()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitModelRequestInput {
    pub channel_name: String,
    #[serde(default)]
    pub target_cpa: Option<f64>,
    #[serde(default)]
    pub current_spend: Option<f64>,
    pub series: Vec<Observation>,
}

impl FitModelRequestInput {
    pub fn validate_and_into_parts(
        self,
        default_target_cpa: f64,
        fit: FitOptions,
    ) -> anyhow::Result<(ChannelHistoryInput, AnalysisSettings)> {
        ensure_target(self.target_cpa)?;
        let history = ChannelHistoryInput {
            channel_name: self.channel_name,
            current_spend: self.current_spend,
            series: self.series,
        };
        history.validate()?;
        Ok((
            history,
            AnalysisSettings {
                default_target_cpa: self.target_cpa.unwrap_or(default_target_cpa),
                fit,
                ..AnalysisSettings::default()
            },
        ))
    }
}
