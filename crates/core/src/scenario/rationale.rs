use crate::domain::{ScenarioAction, TrafficLight};

fn zone_sentence(light: TrafficLight, marginal_cpa: Option<f64>, target: f64) -> String {
    match (light, marginal_cpa) {
        (TrafficLight::Green, Some(mc)) => format!(
            "In the scale zone: marginal CPA ${mc:.2} is under the 90% threshold of the ${target:.2} target"
        ),
        (TrafficLight::Yellow, Some(mc)) => format!(
            "In the maintain zone: marginal CPA ${mc:.2} is within the 90%-110% band of the ${target:.2} target"
        ),
        (TrafficLight::Red, Some(mc)) => format!(
            "In the cut zone: marginal CPA ${mc:.2} is over the 110% threshold of the ${target:.2} target"
        ),
        _ => "No reliable marginal CPA at the current spend".to_string(),
    }
}

fn zone_name(light: TrafficLight) -> Option<&'static str> {
    match light {
        TrafficLight::Green => Some("scale"),
        TrafficLight::Yellow => Some("maintain"),
        TrafficLight::Red => Some("cut"),
        TrafficLight::Grey => None,
    }
}

/// Where the move leaves the channel, relative to where it started.
fn transition(current: TrafficLight, projected: TrafficLight) -> String {
    match (zone_name(current), zone_name(projected)) {
        (_, None) => String::new(),
        (Some(from), Some(to)) if from == to => format!(", staying in the {to} zone"),
        (_, Some(to)) => format!(", moving it into the {to} zone"),
    }
}

/// Human-readable explanation of one channel's recommendation.
///
/// Moves that run against the current zone (cutting a scale-zone channel, growing a
/// cut-zone one) are attributed to the scenario's budget constraint.
pub(crate) fn explain(
    action: ScenarioAction,
    current: TrafficLight,
    projected: TrafficLight,
    marginal_cpa: Option<f64>,
    target: f64,
    spend_delta: f64,
    blocked_reason: Option<&str>,
) -> String {
    let zone = zone_sentence(current, marginal_cpa, target);
    let amount = spend_delta.abs();
    let moved = transition(current, projected);

    match (action, current) {
        (ScenarioAction::Locked, _) => "Channel is locked, so spend is held constant.".to_string(),
        (ScenarioAction::InsufficientData, _) => match blocked_reason {
            Some(reason) => format!("Action blocked until data quality improves. {reason}"),
            None => "Action blocked until data quality improves.".to_string(),
        },
        (ScenarioAction::Increase, TrafficLight::Green) => format!(
            "{zone}, leaving room before the target is reached; increasing spend by ${amount:.2}/day{moved}."
        ),
        (ScenarioAction::Increase, _) => format!(
            "{zone}; spend was increased by ${amount:.2}/day to meet the target budget{moved}."
        ),
        (ScenarioAction::Decrease, TrafficLight::Red | TrafficLight::Grey) => {
            format!("{zone}; decreasing spend by ${amount:.2}/day{moved}.")
        }
        (ScenarioAction::Decrease, _) => format!(
            "{zone}, but spend was reduced by ${amount:.2}/day to satisfy overall budget constraints{moved}."
        ),
        (ScenarioAction::Maintain, TrafficLight::Green | TrafficLight::Red) => {
            format!("{zone}, but spend is held flat due to scenario constraints.")
        }
        (ScenarioAction::Maintain, _) => format!("{zone}; holding spend steady."),
    }
}
