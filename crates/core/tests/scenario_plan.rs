use serde_json::json;
use spendcurve_core::domain::contract::ScenarioRequestInput;
use spendcurve_core::domain::{ChannelSnapshot, DataQualityState, FittedModel, ScenarioAction, TrafficLight};
use spendcurve_core::scenario::{recommend, ScenarioRequest};

fn snapshot(name: &str, spend: f64, max_yield: f64, history_days: u32) -> ChannelSnapshot {
    // beta = 1, kappa = 1000: marginal CPA at spend 1000 is 4200 / max_yield.
    let model = FittedModel::new(0.0, 1.0, 1000.0, max_yield, 0.92).unwrap();
    ChannelSnapshot::new(name, spend, 50.0, Some(model), history_days).unwrap()
}

#[test]
fn reallocates_from_cut_zone_to_scale_zone() {
    let channels = vec![snapshot("A", 1000.0, 105.0, 90), snapshot("B", 1000.0, 70.0, 90)];
    let plan = recommend(&channels, &ScenarioRequest::default()).unwrap();

    let a = plan.recommendation("A").unwrap();
    let b = plan.recommendation("B").unwrap();
    assert_eq!(a.current_marginal_cpa, Some(40.0));
    assert_eq!(b.current_marginal_cpa, Some(60.0));
    assert_eq!(a.action, ScenarioAction::Increase);
    assert_eq!(b.action, ScenarioAction::Decrease);
    assert!((a.spend_delta + b.spend_delta).abs() < 1e-9);
    assert!(plan.projected_summary.total_spend_delta.abs() < 1e-9);
    assert!(a.projected_marginal_cpa.unwrap() > a.current_marginal_cpa.unwrap());
    assert!(b.projected_marginal_cpa.unwrap() < b.current_marginal_cpa.unwrap());
    assert!(a.rationale.contains("scale zone"));
    assert!(a.rationale.contains("/day"));
}

#[test]
fn locked_channels_hold_spend_exactly() {
    let channels = vec![
        snapshot("A", 1000.0, 105.0, 90),
        snapshot("B", 1234.56, 70.0, 90),
        snapshot("C", 800.0, 50.0, 90),
    ];
    let request = ScenarioRequest {
        budget_delta_percent: 10.0,
        locked_channels: vec!["b".to_string()],
        ..ScenarioRequest::default()
    };
    let plan = recommend(&channels, &request).unwrap();

    let b = plan.recommendation("B").unwrap();
    assert_eq!(b.action, ScenarioAction::Locked);
    assert!(b.locked);
    assert_eq!(b.recommended_spend, b.current_spend);
    assert_eq!(b.spend_delta, 0.0);
    assert_eq!(b.traffic_light, TrafficLight::Red);
    assert_eq!(plan.projected_summary.channels_locked, 1);
}

#[test]
fn low_quality_channels_are_blocked() {
    let weak = FittedModel::new(0.0, 1.0, 1000.0, 105.0, 0.42).unwrap();
    let channels = vec![
        snapshot("Short", 500.0, 105.0, 10),
        ChannelSnapshot::new("Weak", 700.0, 50.0, Some(weak), 60).unwrap(),
        snapshot("Good", 1000.0, 70.0, 60),
    ];
    let request = ScenarioRequest {
        budget_delta_percent: -10.0,
        ..ScenarioRequest::default()
    };
    let plan = recommend(&channels, &request).unwrap();

    for name in ["Short", "Weak"] {
        let r = plan.recommendation(name).unwrap();
        assert_eq!(r.action, ScenarioAction::InsufficientData);
        assert!(r.is_action_blocked);
        assert_eq!(r.spend_delta, 0.0);
        assert_eq!(r.traffic_light, TrafficLight::Grey);
        assert!(r.blocked_reason.is_some());
    }
    assert_eq!(
        plan.recommendation("Short").unwrap().data_quality_state,
        DataQualityState::InsufficientHistory
    );
    let weak_reason = plan.recommendation("Weak").unwrap().blocked_reason.clone().unwrap();
    assert!(weak_reason.contains("0.420"));

    let good = plan.recommendation("Good").unwrap();
    assert_eq!(good.action, ScenarioAction::Decrease);
    assert!((plan.projected_summary.total_spend_delta - good.spend_delta).abs() < 1e-9);
    assert_eq!(plan.projected_summary.channels_insufficient_data, 2);
}

#[test]
fn summary_is_sum_of_recommendations() {
    let channels = vec![
        snapshot("A", 1000.0, 105.0, 90),
        snapshot("B", 750.0, 70.0, 90),
        snapshot("C", 420.0, 90.0, 90),
        snapshot("D", 1500.0, 160.0, 90),
    ];
    let request = ScenarioRequest {
        budget_delta_percent: 12.5,
        ..ScenarioRequest::default()
    };
    let plan = recommend(&channels, &request).unwrap();
    let summary = &plan.projected_summary;

    let delta_sum: f64 = plan.recommendations.iter().map(|r| r.spend_delta).sum();
    let projected_sum: f64 = plan.recommendations.iter().map(|r| r.recommended_spend).sum();
    assert!((summary.total_spend_delta - delta_sum).abs() < 1e-6);
    assert!((summary.projected_total_spend - projected_sum).abs() < 1e-6);
    assert!((summary.projected_total_spend - summary.current_total_spend - summary.total_spend_delta).abs() < 1e-6);
    assert!((summary.total_spend_delta - summary.requested_spend_delta).abs() < 0.05);

    let counted = summary.channels_increase
        + summary.channels_decrease
        + summary.channels_maintain
        + summary.channels_locked
        + summary.channels_insufficient_data;
    assert_eq!(counted, plan.recommendations.len());

    let deltas: Vec<f64> = plan.recommendations.iter().map(|r| r.spend_delta.abs()).collect();
    assert!(deltas.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn infeasible_cut_reports_shortfall() {
    let channels = vec![snapshot("A", 1000.0, 105.0, 90), snapshot("Short", 400.0, 70.0, 5)];
    let request = ScenarioRequest {
        budget_delta_percent: -90.0,
        ..ScenarioRequest::default()
    };
    let plan = recommend(&channels, &request).unwrap();
    let summary = &plan.projected_summary;

    assert_eq!(summary.requested_spend_delta, -1260.0);
    assert_eq!(summary.total_spend_delta, -1000.0);
    assert_eq!(plan.recommendation("A").unwrap().recommended_spend, 0.0);
}

#[test]
fn identical_inputs_give_identical_plans() {
    let input = json!({
        "target_cpa": 50.0,
        "budget_delta_percent": 7.5,
        "locked_channels": ["Display"],
        "target_cpa_overrides": [
            {"entity_type": "channel", "entity_key": "search", "target_cpa": 45.0},
            {"entity_type": "campaign", "entity_key": "Brand Q3", "target_cpa": 10.0}
        ],
        "channels": [
            {"channel_name": "Search", "current_spend": 1000.0, "history_days": 60,
             "model_params": {"alpha": 0.2, "beta": 1.3, "kappa": 900.0, "max_yield": 140.0, "r_squared": 0.88},
             "prior_adstock_state": 1150.0},
            {"channel_name": "Social", "current_spend": 600.0, "history_days": 45,
             "model_params": {"alpha": 0.0, "beta": 0.9, "kappa": 700.0, "max_yield": 60.0, "r_squared": 0.71}},
            {"channel_name": "Display", "current_spend": 300.0, "history_days": 30,
             "model_params": {"alpha": 0.0, "beta": 1.0, "kappa": 500.0, "max_yield": 20.0, "r_squared": 0.8}},
            {"channel_name": "Video", "current_spend": 250.0, "history_days": 12}
        ]
    });

    let run = || {
        let parsed: ScenarioRequestInput = serde_json::from_value(input.clone()).unwrap();
        let (channels, request) = parsed.validate_and_into_parts().unwrap();
        serde_json::to_vec(&recommend(&channels, &request).unwrap()).unwrap()
    };

    let first = run();
    assert_eq!(first, run());

    let plan: serde_json::Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(plan["scenario_name"], "Auto Scenario (+7.5% budget)");
    let search = plan["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["channel_name"] == "Search")
        .unwrap();
    assert_eq!(search["target_cpa"], 45.0);
}
