use crate::classify::classify;
use crate::domain::snapshot::{channel_key, resolve_target};
use crate::domain::{
    ChannelSnapshot, DataQualityState, FittedModel, ProjectedSummary, ScenarioAction, ScenarioPlan,
    ScenarioRecommendation, TrafficLight,
};
use crate::marginal::{marginal_cost_with_carryover, MARGINAL_INCREMENT};
use crate::numeric::{percent_of, round_cents, round_to, safe_ratio, SPEND_EPSILON};
use crate::scenario::{rationale, ScenarioRequest};
use anyhow::{bail, ensure};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Step allowance per eligible channel in each phase.
pub const MAX_STEPS: usize = 500;

/// Net spend differences at or below this are treated as zero.
pub const SPEND_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Untouched,
    Up,
    Down,
}

/// Simulation state for one channel.
struct Lane<'a> {
    snapshot: &'a ChannelSnapshot,
    model: Option<&'a FittedModel>,
    target: f64,
    locked: bool,
    eligible: bool,
    step: f64,
    simulated: f64,
    direction: Direction,
}

impl<'a> Lane<'a> {
    fn new(snapshot: &'a ChannelSnapshot, target: f64, locked: bool) -> Self {
        let quality_ok = snapshot.data_quality_state().is_ok();
        let model = if quality_ok { snapshot.model.as_ref() } else { None };
        let eligible = !locked && model.is_some() && snapshot.current_spend > 0.0;
        Self {
            snapshot,
            model,
            target,
            locked,
            eligible,
            step: snapshot.current_spend * MARGINAL_INCREMENT,
            simulated: snapshot.current_spend,
            direction: Direction::Untouched,
        }
    }

    fn name(&self) -> &str {
        &self.snapshot.channel_name
    }

    fn marginal_at(&self, spend: f64) -> Option<f64> {
        self.model.and_then(|m| {
            marginal_cost_with_carryover(m, spend, self.snapshot.prior_adstock_state, MARGINAL_INCREMENT)
        })
    }

    fn zone_at(&self, spend: f64) -> TrafficLight {
        classify(self.marginal_at(spend), self.target)
    }

    /// Marginal cost relative to target at the simulated spend.
    fn ratio(&self) -> Option<f64> {
        self.marginal_at(self.simulated)
            .and_then(|mc| safe_ratio(mc, self.target))
    }

    fn can_receive(&self) -> bool {
        self.eligible && self.direction != Direction::Down
    }

    fn can_donate(&self) -> bool {
        self.eligible && self.direction != Direction::Up && self.simulated > SPEND_EPSILON
    }
}

/// Cheapest place for the next step. Lanes are in name order, so the strict
/// comparison keeps the first name on ties.
fn best_receiver(lanes: &[Lane<'_>], exclude: Option<usize>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, lane) in lanes.iter().enumerate() {
        if Some(i) == exclude || !lane.can_receive() {
            continue;
        }
        let Some(ratio) = lane.ratio() else { continue };
        if best.map_or(true, |(_, r)| ratio.total_cmp(&r) == Ordering::Less) {
            best = Some((i, ratio));
        }
    }
    best.map(|(i, _)| i)
}

/// Most expensive lane to take a step from; a saturated lane counts as infinitely expensive.
fn worst_donor(lanes: &[Lane<'_>], exclude: Option<usize>) -> Option<usize> {
    let mut worst: Option<(usize, f64)> = None;
    for (i, lane) in lanes.iter().enumerate() {
        if Some(i) == exclude || !lane.can_donate() {
            continue;
        }
        let ratio = lane.ratio().unwrap_or(f64::INFINITY);
        if worst.map_or(true, |(_, r)| ratio.total_cmp(&r) == Ordering::Greater) {
            worst = Some((i, ratio));
        }
    }
    worst.map(|(i, _)| i)
}

fn move_up(lane: &mut Lane<'_>, amount: f64) {
    lane.simulated += amount;
    lane.direction = Direction::Up;
}

fn move_down(lane: &mut Lane<'_>, amount: f64) {
    lane.simulated = (lane.simulated - amount).max(0.0);
    lane.direction = Direction::Down;
}

/// Steps the budget phase may take: enough to place `requested` in the smallest eligible step,
/// plus one partial step per lane, and never less than `MAX_STEPS` per eligible lane.
fn budget_step_limit(lanes: &[Lane<'_>], requested: f64) -> usize {
    let eligible = lanes.iter().filter(|l| l.eligible).count();
    let min_step = lanes
        .iter()
        .filter(|l| l.eligible)
        .map(|l| l.step)
        .fold(f64::INFINITY, f64::min);
    if eligible == 0 || !min_step.is_finite() || min_step <= 0.0 {
        return 0;
    }
    let needed = (requested.abs() / min_step).ceil() as usize;
    needed
        .saturating_add(2 * eligible)
        .max(MAX_STEPS.saturating_mul(eligible))
}

/// Moves spend until the total matches the requested delta. Returns the unallocated remainder.
fn allocate_budget(lanes: &mut [Lane<'_>], requested: f64) -> f64 {
    let mut remaining = requested;
    for _ in 0..budget_step_limit(lanes, requested) {
        if remaining.abs() <= SPEND_TOLERANCE {
            break;
        }
        if remaining > 0.0 {
            let Some(i) = best_receiver(lanes, None) else { break };
            let amount = lanes[i].step.min(remaining);
            move_up(&mut lanes[i], amount);
            remaining -= amount;
            tracing::debug!(channel = lanes[i].name(), amount, remaining, "budget step up");
        } else {
            let Some(i) = worst_donor(lanes, None) else { break };
            let amount = lanes[i].step.min(lanes[i].simulated).min(-remaining);
            move_down(&mut lanes[i], amount);
            remaining += amount;
            tracing::debug!(channel = lanes[i].name(), amount, remaining, "budget step down");
        }
    }
    remaining
}

/// Shifts spend from the worst lane to the best while that moves money into a better zone.
fn rebalance(lanes: &mut [Lane<'_>]) -> usize {
    let eligible = lanes.iter().filter(|l| l.eligible).count();
    let mut swaps = 0;
    for _ in 0..MAX_STEPS.saturating_mul(eligible) {
        let Some(receiver) = best_receiver(lanes, None) else { break };
        let Some(donor) = worst_donor(lanes, Some(receiver)) else { break };

        let amount = lanes[receiver]
            .step
            .min(lanes[donor].step)
            .min(lanes[donor].simulated);
        if amount <= SPEND_EPSILON {
            break;
        }

        let receiver_zone = lanes[receiver].zone_at(lanes[receiver].simulated + amount);
        let donor_zone = lanes[donor].zone_at(lanes[donor].simulated);
        if receiver_zone.rank() >= donor_zone.rank() {
            break;
        }

        move_up(&mut lanes[receiver], amount);
        move_down(&mut lanes[donor], amount);
        swaps += 1;
        tracing::debug!(
            from = lanes[donor].name(),
            to = lanes[receiver].name(),
            amount,
            "rebalance step"
        );
    }
    swaps
}

fn finalize(lane: &Lane<'_>) -> ScenarioRecommendation {
    let snapshot = lane.snapshot;
    let current = snapshot.current_spend;
    let quality = snapshot.data_quality();

    if !quality.state.is_ok() && !lane.locked {
        let blocked_reason = quality.reason.clone();
        return ScenarioRecommendation {
            channel_name: snapshot.channel_name.clone(),
            action: ScenarioAction::InsufficientData,
            rationale: rationale::explain(
                ScenarioAction::InsufficientData,
                TrafficLight::Grey,
                TrafficLight::Grey,
                None,
                lane.target,
                0.0,
                blocked_reason.as_deref(),
            ),
            current_spend: current,
            recommended_spend: current,
            spend_delta: 0.0,
            spend_delta_percent: 0.0,
            current_marginal_cpa: None,
            projected_marginal_cpa: None,
            target_cpa: lane.target,
            traffic_light: TrafficLight::Grey,
            locked: false,
            data_quality_state: quality.state,
            data_quality_reason: quality.reason.clone(),
            is_action_blocked: true,
            blocked_reason,
        };
    }

    let (action, recommended) = if lane.locked {
        (ScenarioAction::Locked, current)
    } else {
        let rounded = round_cents(lane.simulated);
        let delta = rounded - current;
        if !lane.eligible || delta.abs() <= SPEND_TOLERANCE {
            (ScenarioAction::Maintain, current)
        } else if delta > 0.0 {
            (ScenarioAction::Increase, rounded)
        } else {
            (ScenarioAction::Decrease, rounded)
        }
    };

    let spend_delta = recommended - current;
    let current_marginal = lane.marginal_at(current);
    let projected_marginal = lane.marginal_at(recommended);
    let traffic_light = classify(current_marginal, lane.target);
    let projected_light = classify(projected_marginal, lane.target);

    ScenarioRecommendation {
        channel_name: snapshot.channel_name.clone(),
        action,
        rationale: rationale::explain(
            action,
            traffic_light,
            projected_light,
            current_marginal,
            lane.target,
            spend_delta,
            None,
        ),
        current_spend: current,
        recommended_spend: recommended,
        spend_delta,
        spend_delta_percent: round_to(percent_of(spend_delta, current), 2),
        current_marginal_cpa: current_marginal.map(round_cents),
        projected_marginal_cpa: projected_marginal.map(round_cents),
        target_cpa: lane.target,
        traffic_light,
        locked: lane.locked,
        data_quality_state: quality.state,
        data_quality_reason: quality.reason.clone(),
        is_action_blocked: false,
        blocked_reason: None,
    }
}

fn summarize(recommendations: &[ScenarioRecommendation], requested_spend_delta: f64) -> ProjectedSummary {
    let current_total_spend: f64 = recommendations.iter().map(|r| r.current_spend).sum();
    let projected_total_spend: f64 = recommendations.iter().map(|r| r.recommended_spend).sum();
    let total_spend_delta: f64 = recommendations.iter().map(|r| r.spend_delta).sum();
    let count = |action: ScenarioAction| recommendations.iter().filter(|r| r.action == action).count();

    ProjectedSummary {
        current_total_spend,
        projected_total_spend,
        total_spend_delta,
        total_spend_delta_percent: round_to(percent_of(total_spend_delta, current_total_spend), 2),
        requested_spend_delta: round_cents(requested_spend_delta),
        channels_increase: count(ScenarioAction::Increase),
        channels_decrease: count(ScenarioAction::Decrease),
        channels_maintain: count(ScenarioAction::Maintain),
        channels_locked: count(ScenarioAction::Locked),
        channels_insufficient_data: count(ScenarioAction::InsufficientData),
    }
}

/// Builds a spend plan from channel snapshots.
///
/// Pure: the same snapshots and request always produce the same plan. A budget delta that
/// cannot be fully placed is allocated as far as possible and shows up as a gap between
/// `requested_spend_delta` and `total_spend_delta`.
pub fn recommend(channels: &[ChannelSnapshot], request: &ScenarioRequest) -> anyhow::Result<ScenarioPlan> {
    ensure!(
        request.budget_delta_percent.is_finite(),
        "budget_delta_percent must be finite"
    );

    let mut ordered: Vec<&ChannelSnapshot> = channels.iter().collect();
    ordered.sort_by(|a, b| a.channel_name.cmp(&b.channel_name));
    let mut seen = BTreeSet::new();
    for snapshot in &ordered {
        if !seen.insert(snapshot.key()) {
            bail!("duplicate channel: {}", snapshot.channel_name);
        }
    }

    let locked: BTreeSet<String> = request.locked_channels.iter().map(|n| channel_key(n)).collect();
    let mut lanes: Vec<Lane<'_>> = ordered
        .into_iter()
        .map(|snapshot| {
            let (target, _) = resolve_target(
                &snapshot.channel_name,
                snapshot.target_cpa,
                &request.target_cpa_overrides,
            );
            Lane::new(snapshot, target, locked.contains(&snapshot.key()))
        })
        .collect();

    let current_total: f64 = lanes.iter().map(|l| l.snapshot.current_spend).sum();
    let target_total = (current_total * (1.0 + request.budget_delta_percent / 100.0)).max(0.0);
    let requested = target_total - current_total;

    let remaining = allocate_budget(&mut lanes, requested);
    if remaining.abs() > SPEND_TOLERANCE {
        tracing::warn!(
            requested,
            shortfall = remaining,
            "budget delta could not be fully allocated"
        );
    }
    let swaps = rebalance(&mut lanes);

    let mut recommendations: Vec<ScenarioRecommendation> = lanes.iter().map(finalize).collect();
    recommendations.sort_by(|a, b| {
        b.spend_delta
            .abs()
            .total_cmp(&a.spend_delta.abs())
            .then_with(|| a.channel_name.cmp(&b.channel_name))
    });

    let projected_summary = summarize(&recommendations, requested);
    let blocked = lanes
        .iter()
        .filter(|l| l.snapshot.data_quality_state() != DataQualityState::Ok)
        .count();
    tracing::info!(
        channels = recommendations.len(),
        locked = projected_summary.channels_locked,
        blocked,
        swaps,
        total_spend_delta = projected_summary.total_spend_delta,
        "scenario plan built"
    );

    Ok(ScenarioPlan {
        scenario_name: request.resolved_name(),
        recommendations,
        projected_summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, spend: f64, max_yield: f64, days: u32) -> ChannelSnapshot {
        let model = FittedModel::new(0.0, 1.0, 1000.0, max_yield, 0.9).unwrap();
        ChannelSnapshot::new(name, spend, 50.0, Some(model), days).unwrap()
    }

    #[test]
    fn green_receives_from_red() {
        let channels = vec![channel("B", 1000.0, 70.0, 60), channel("A", 1000.0, 105.0, 60)];
        let plan = recommend(&channels, &ScenarioRequest::default()).unwrap();

        let a = plan.recommendation("A").unwrap();
        let b = plan.recommendation("B").unwrap();
        assert_eq!(a.action, ScenarioAction::Increase);
        assert_eq!(b.action, ScenarioAction::Decrease);
        assert_eq!(a.traffic_light, TrafficLight::Green);
        assert_eq!(b.traffic_light, TrafficLight::Red);
        assert!((a.spend_delta + b.spend_delta).abs() < 1e-9);
        assert!(plan.projected_summary.total_spend_delta.abs() < 1e-9);
        assert_eq!(plan.scenario_name, "Auto Scenario (+0.0% budget)");
    }

    #[test]
    fn all_locked_is_a_valid_plan() {
        let channels = vec![channel("A", 1000.0, 105.0, 60), channel("B", 500.0, 70.0, 60)];
        let request = ScenarioRequest {
            budget_delta_percent: 20.0,
            locked_channels: vec!["a".to_string(), " B ".to_string()],
            ..ScenarioRequest::default()
        };
        let plan = recommend(&channels, &request).unwrap();
        assert!(plan.recommendations.iter().all(|r| r.action == ScenarioAction::Locked));
        assert_eq!(plan.projected_summary.total_spend_delta, 0.0);
        assert_eq!(plan.projected_summary.requested_spend_delta, 300.0);
        assert_eq!(plan.projected_summary.channels_locked, 2);
    }

    #[test]
    fn budget_increase_goes_to_cheapest_channel() {
        let channels = vec![channel("A", 1000.0, 105.0, 60), channel("B", 1000.0, 70.0, 60)];
        let request = ScenarioRequest {
            budget_delta_percent: 5.0,
            ..ScenarioRequest::default()
        };
        let plan = recommend(&channels, &request).unwrap();
        let a = plan.recommendation("A").unwrap();
        assert_eq!(a.action, ScenarioAction::Increase);
        assert!((plan.projected_summary.total_spend_delta - 100.0).abs() < 1e-6);
    }

    #[test]
    fn large_feasible_budget_is_fully_placed() {
        let channels: Vec<ChannelSnapshot> = (0..60)
            .map(|i| channel(&format!("ch{i:02}"), 1000.0, 105.0, 60))
            .collect();
        let request = ScenarioRequest {
            budget_delta_percent: 100.0,
            ..ScenarioRequest::default()
        };
        let plan = recommend(&channels, &request).unwrap();
        let summary = &plan.projected_summary;
        assert_eq!(summary.requested_spend_delta, 60_000.0);
        assert!((summary.total_spend_delta - summary.requested_spend_delta).abs() < 1.0);
        assert_eq!(summary.channels_increase, 60);

        let single = vec![channel("A", 1000.0, 105.0, 60)];
        let request = ScenarioRequest {
            budget_delta_percent: 8000.0,
            ..ScenarioRequest::default()
        };
        let plan = recommend(&single, &request).unwrap();
        assert!((plan.projected_summary.total_spend_delta - 80_000.0).abs() < 1.0);
    }

    #[test]
    fn forced_cut_of_scale_zone_channel_cites_budget() {
        let channels = vec![channel("A", 1000.0, 105.0, 60), channel("B", 1000.0, 120.0, 60)];
        let request = ScenarioRequest {
            budget_delta_percent: -10.0,
            ..ScenarioRequest::default()
        };
        let plan = recommend(&channels, &request).unwrap();
        let cut: Vec<_> = plan
            .recommendations
            .iter()
            .filter(|r| r.action == ScenarioAction::Decrease)
            .collect();
        assert!(!cut.is_empty());
        for r in cut {
            assert_eq!(r.traffic_light, TrafficLight::Green);
            assert!(r.rationale.contains("to satisfy overall budget constraints"), "{}", r.rationale);
        }
    }

    #[test]
    fn rejects_duplicate_snapshots() {
        let channels = vec![channel("A", 1000.0, 105.0, 60), channel("a", 1000.0, 105.0, 60)];
        assert!(recommend(&channels, &ScenarioRequest::default()).is_err());
    }

    #[test]
    fn override_changes_zone() {
        let channels = vec![channel("A", 1000.0, 105.0, 60)];
        let request = ScenarioRequest {
            target_cpa_overrides: vec![crate::domain::TargetOverride {
                entity_type: crate::domain::EntityType::Channel,
                entity_key: "A".to_string(),
                target_cpa: 30.0,
            }],
            ..ScenarioRequest::default()
        };
        let plan = recommend(&channels, &request).unwrap();
        let a = plan.recommendation("A").unwrap();
        assert_eq!(a.target_cpa, 30.0);
        assert_eq!(a.traffic_light, TrafficLight::Red);
        assert_eq!(a.action, ScenarioAction::Maintain);
    }

    #[test]
    fn provided_name_is_kept() {
        let request = ScenarioRequest {
            scenario_name: Some("  Q3 push ".to_string()),
            ..ScenarioRequest::default()
        };
        let plan = recommend(&[], &request).unwrap();
        assert_eq!(plan.scenario_name, "Q3 push");
        assert!(plan.recommendations.is_empty());
        assert_eq!(plan.projected_summary.total_spend_delta_percent, 0.0);
    }
}
