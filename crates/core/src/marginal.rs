//! Marginal cost of the next unit of spend, estimated from a fitted curve.

use crate::classify::classify;
use crate::curve::evaluate_adstocked;
use crate::domain::{FittedModel, TrafficLight};
use crate::numeric::{round_cents, round_to, safe_ratio};
use serde::{Deserialize, Serialize};

/// Relative spend step for the finite difference; the allocation engine simulates in the same step.
pub const MARGINAL_INCREMENT: f64 = 0.10;

/// Intervals between the first and last sampled spend level.
pub const CURVE_STEPS: usize = 120;

const CURVE_MIN_FRACTION: f64 = 0.05;
const CURVE_MIN_SPEND: f64 = 10.0;
const CURVE_MAX_MULTIPLE: f64 = 4.0;
/// Points costing more than this multiple of target are dropped from the series.
const CURVE_TAIL_MULTIPLE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub spend: f64,
    pub marginal_cpa: f64,
    pub zone: TrafficLight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentPoint {
    pub spend: f64,
    pub marginal_cpa: Option<f64>,
}

/// `None` when spend is not positive or the curve is flat (saturated) over the step.
pub fn marginal_cost(model: &FittedModel, spend: f64, increment: f64) -> Option<f64> {
    marginal_cost_with_carryover(model, spend, 0.0, increment)
}

pub fn marginal_cost_with_carryover(
    model: &FittedModel,
    spend: f64,
    carryover: f64,
    increment: f64,
) -> Option<f64> {
    if !spend.is_finite() || spend <= 0.0 || increment <= 0.0 {
        return None;
    }
    let spend_next = spend * (1.0 + increment);
    let delta_output = evaluate_adstocked(model, spend_next, carryover) - evaluate_adstocked(model, spend, carryover);
    if delta_output.is_nan() || delta_output <= 0.0 {
        return None;
    }
    safe_ratio(spend_next - spend, delta_output).filter(|mc| *mc > 0.0)
}

/// Samples the marginal-cost curve around `current_spend` for display.
///
/// Returns no points when `current_spend` is not positive.
pub fn curve_series(
    model: &FittedModel,
    current_spend: f64,
    target: f64,
    carryover: f64,
) -> (Vec<CurvePoint>, Option<CurrentPoint>) {
    if !current_spend.is_finite() || current_spend <= 0.0 {
        return (Vec::new(), None);
    }

    let min_spend = (current_spend * CURVE_MIN_FRACTION).max(CURVE_MIN_SPEND);
    let max_spend = (current_spend * CURVE_MAX_MULTIPLE).max(min_spend * 1.1);
    let step = (max_spend - min_spend) / CURVE_STEPS as f64;
    let tail = target * CURVE_TAIL_MULTIPLE;

    let points = (0..=CURVE_STEPS)
        .filter_map(|i| {
            let spend = min_spend + step * i as f64;
            let mc = marginal_cost_with_carryover(model, spend, carryover, MARGINAL_INCREMENT)?;
            if mc > tail {
                return None;
            }
            let zone = classify(Some(mc), target);
            (zone != TrafficLight::Grey).then(|| CurvePoint {
                spend: round_to(spend, 0),
                marginal_cpa: round_cents(mc),
                zone,
            })
        })
        .collect();

    let current = CurrentPoint {
        spend: round_to(current_spend, 0),
        marginal_cpa: marginal_cost_with_carryover(model, current_spend, carryover, MARGINAL_INCREMENT)
            .map(round_cents),
    };

    (points, Some(current))
}
