//! Per-channel pipeline: history -> fitted curve -> quality, zone and display series.
//!
//! Channels are independent. A failure while fitting one channel degrades that channel to
//! `grey` and is reported in `fit_message`; it never fails the batch.

use crate::classify::{classify, zone_recommendation};
use crate::curve::{fit, predict_history, prior_adstock_state, FitOptions};
use crate::domain::contract::{ChannelHistoryInput, DEFAULT_TARGET_CPA};
use crate::domain::snapshot::resolve_target;
use crate::domain::{
    ChannelSnapshot, ConfidenceTier, DataQualityState, FittedModel, HistoricalSeries, ModelParams,
    TargetOverride, TargetSource, TrafficLight,
};
use crate::marginal::{curve_series, marginal_cost_with_carryover, CurrentPoint, CurvePoint, MARGINAL_INCREMENT};
use crate::numeric::round_cents;
use crate::quality::{assess, confidence_tier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub default_target_cpa: f64,
    pub target_cpa_overrides: Vec<TargetOverride>,
    pub fit: FitOptions,
    /// Ignore observations after this date.
    pub as_of: Option<NaiveDate>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            default_target_cpa: DEFAULT_TARGET_CPA,
            target_cpa_overrides: Vec::new(),
            fit: FitOptions::default(),
            as_of: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedPoint {
    pub date: NaiveDate,
    pub actual: f64,
    pub fitted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAnalysis {
    pub channel_name: String,
    pub current_spend: f64,
    pub history_days: u32,
    pub marginal_cpa: Option<f64>,
    pub average_cpa: Option<f64>,
    pub target_cpa: f64,
    pub target_source: TargetSource,
    pub traffic_light: TrafficLight,
    pub recommendation: String,
    pub data_quality_state: DataQualityState,
    pub data_quality_reason: Option<String>,
    pub confidence_tier: ConfidenceTier,
    pub model_params: Option<ModelParams>,
    pub prior_adstock_state: f64,
    pub curve_points: Vec<CurvePoint>,
    pub current_point: Option<CurrentPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fitted_history: Vec<FittedPoint>,
    /// Why no usable curve was produced, when that happens.
    pub fit_message: Option<String>,
}

impl ChannelAnalysis {
    pub fn fitted_model(&self) -> Option<FittedModel> {
        self.model_params.and_then(|p| FittedModel::try_from(p).ok())
    }

    /// Input for the scenario engine; quality is re-derived from the same days and model.
    pub fn to_snapshot(&self) -> anyhow::Result<ChannelSnapshot> {
        let snapshot = ChannelSnapshot::new(
            self.channel_name.clone(),
            self.current_spend,
            self.target_cpa,
            self.fitted_model(),
            self.history_days,
        )?;
        Ok(snapshot.with_prior_adstock_state(self.prior_adstock_state))
    }
}

pub fn analyze_channel(input: &ChannelHistoryInput, settings: &AnalysisSettings) -> ChannelAnalysis {
    let channel_name = input.channel_name.trim().to_string();
    let (target_cpa, target_source) = resolve_target(
        &channel_name,
        settings.default_target_cpa,
        &settings.target_cpa_overrides,
    );

    let raw_days = input
        .series
        .iter()
        .filter(|o| settings.as_of.map_or(true, |as_of| o.date <= as_of))
        .map(|o| o.date)
        .collect::<BTreeSet<_>>()
        .len();

    let (series, mut fit_message) = match HistoricalSeries::new(input.series.clone()) {
        Ok(series) => match settings.as_of {
            Some(as_of) => (Some(series.until(as_of)), None),
            None => (Some(series), None),
        },
        Err(e) => (None, Some(e.to_string())),
    };
    let history_days = u32::try_from(raw_days).unwrap_or(u32::MAX);

    let model = match &series {
        Some(series) => match fit(series, &settings.fit) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(channel = %channel_name, error = %e, "response curve fit failed");
                fit_message = Some(e.to_string());
                None
            }
        },
        None => None,
    };

    let current_spend = input
        .current_spend
        .or_else(|| series.as_ref().and_then(HistoricalSeries::latest_spend))
        .unwrap_or(0.0);
    let spends = series.as_ref().map(HistoricalSeries::spends).unwrap_or_default();
    let carryover = model
        .map(|m| prior_adstock_state(&spends, current_spend, m.alpha()))
        .unwrap_or(0.0);

    let quality = assess(history_days, model.as_ref());
    let marginal = model.and_then(|m| marginal_cost_with_carryover(&m, current_spend, carryover, MARGINAL_INCREMENT));
    let traffic_light = if quality.state.is_ok() {
        classify(marginal, target_cpa)
    } else {
        TrafficLight::Grey
    };

    let (curve_points, current_point) = match &model {
        Some(m) => curve_series(m, current_spend, target_cpa, carryover),
        None => (Vec::new(), None),
    };

    let fitted_history = match (&model, &series) {
        (Some(m), Some(series)) => series
            .observations()
            .iter()
            .zip(predict_history(m, &spends))
            .map(|(o, fitted)| FittedPoint {
                date: o.date,
                actual: o.output,
                fitted: round_cents(fitted),
            })
            .collect(),
        _ => Vec::new(),
    };

    ChannelAnalysis {
        channel_name,
        current_spend,
        history_days,
        marginal_cpa: marginal.map(round_cents),
        average_cpa: series.as_ref().and_then(HistoricalSeries::average_cpa).map(round_cents),
        target_cpa,
        target_source,
        traffic_light,
        recommendation: zone_recommendation(traffic_light).to_string(),
        data_quality_state: quality.state,
        data_quality_reason: quality.reason,
        confidence_tier: confidence_tier(model.as_ref()),
        model_params: model.map(|m| m.params()),
        prior_adstock_state: carryover,
        curve_points,
        current_point,
        fitted_history,
        fit_message,
    }
}

/// Orders results green, yellow, red, grey; then by marginal CPA, then by name.
pub fn sort_analyses(analyses: &mut [ChannelAnalysis]) {
    analyses.sort_by(|a, b| {
        a.traffic_light
            .rank()
            .cmp(&b.traffic_light.rank())
            .then_with(|| {
                let a_mc = a.marginal_cpa.unwrap_or(f64::INFINITY);
                let b_mc = b.marginal_cpa.unwrap_or(f64::INFINITY);
                a_mc.total_cmp(&b_mc)
            })
            .then_with(|| a.channel_name.cmp(&b.channel_name))
    });
}

pub fn analyze_channels(inputs: &[ChannelHistoryInput], settings: &AnalysisSettings) -> Vec<ChannelAnalysis> {
    let mut out: Vec<ChannelAnalysis> = inputs.iter().map(|input| analyze_channel(input, settings)).collect();
    sort_analyses(&mut out);
    out
}
