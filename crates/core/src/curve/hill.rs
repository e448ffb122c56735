use crate::domain::FittedModel;
use crate::numeric::SPEND_EPSILON;

/// `max_yield * x^beta / (kappa^beta + x^beta)`, written as `r / (1 + r)` with
/// `r = (x / kappa)^beta` so large spend saturates to `max_yield` instead of `inf / inf`.
pub(crate) fn hill(x: f64, max_yield: f64, beta: f64, kappa: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let x = x.max(SPEND_EPSILON);
    let r = (x / kappa).powf(beta);
    if !r.is_finite() {
        return max_yield;
    }
    max_yield * (r / (1.0 + r))
}

/// Output of `model` at `spend` with no carryover from prior days.
pub fn evaluate(model: &FittedModel, spend: f64) -> f64 {
    hill(spend, model.max_yield(), model.beta(), model.kappa())
}

/// Output of `model` for today's `spend` on top of `carryover` adstock from earlier days.
pub fn evaluate_adstocked(model: &FittedModel, spend: f64, carryover: f64) -> f64 {
    evaluate(model, spend + model.alpha() * carryover.max(0.0))
}

/// Geometric adstock: `a[t] = x[t] + alpha * a[t-1]`.
pub fn apply_adstock(spend: &[f64], alpha: f64) -> Vec<f64> {
    if alpha == 0.0 {
        return spend.to_vec();
    }
    let mut out = Vec::with_capacity(spend.len());
    let mut prev = 0.0;
    for &x in spend {
        prev = x + alpha * prev;
        out.push(prev);
    }
    out
}

/// Adstock entering the current day.
///
/// When `history` already ends with `current_spend` that last point is today and is excluded.
pub fn prior_adstock_state(history: &[f64], current_spend: f64, alpha: f64) -> f64 {
    if alpha <= 0.0 || history.is_empty() {
        return 0.0;
    }
    let prior = match history.last() {
        Some(&last) if (last - current_spend).abs() <= 1e-8 * last.abs().max(1.0) => &history[..history.len() - 1],
        _ => history,
    };
    apply_adstock(prior, alpha).last().copied().unwrap_or(0.0)
}

/// Fitted output for each day of `spend`, carrying adstock forward.
pub fn predict_history(model: &FittedModel, spend: &[f64]) -> Vec<f64> {
    apply_adstock(spend, model.alpha())
        .into_iter()
        .map(|x| evaluate(model, x))
        .collect()
}
