use crate::domain::TrafficLight;

/// Below this ratio of marginal cost to target the channel should scale.
pub const SCALE_RATIO: f64 = 0.9;
/// Above this ratio the channel should be cut.
pub const CUT_RATIO: f64 = 1.1;

pub fn classify(marginal_cost: Option<f64>, target: f64) -> TrafficLight {
    if target <= 0.0 {
        return TrafficLight::Grey;
    }
    let Some(ratio) = marginal_cost.and_then(|mc| crate::numeric::safe_ratio(mc, target)) else {
        return TrafficLight::Grey;
    };

    if ratio < SCALE_RATIO {
        TrafficLight::Green
    } else if ratio <= CUT_RATIO {
        TrafficLight::Yellow
    } else {
        TrafficLight::Red
    }
}

pub fn zone_recommendation(light: TrafficLight) -> &'static str {
    match light {
        TrafficLight::Green => "Scale spend - Room for efficient growth",
        TrafficLight::Yellow => "Maintain - At optimal efficiency",
        TrafficLight::Red => "Cut spend - Hitting diminishing returns",
        TrafficLight::Grey => "Insufficient data (need 21+ days)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries() {
        let target = 50.0;
        assert_eq!(classify(Some(0.9 * target), target), TrafficLight::Yellow);
        assert_eq!(classify(Some(0.89 * target), target), TrafficLight::Green);
        assert_eq!(classify(Some(target), target), TrafficLight::Yellow);
        assert_eq!(classify(Some(1.11 * target), target), TrafficLight::Red);
    }

    #[test]
    fn missing_cost_or_bad_target_is_grey() {
        assert_eq!(classify(None, 50.0), TrafficLight::Grey);
        assert_eq!(classify(Some(40.0), 0.0), TrafficLight::Grey);
        assert_eq!(classify(Some(40.0), -5.0), TrafficLight::Grey);
    }
}
