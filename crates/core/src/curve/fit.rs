use crate::curve::hill::{apply_adstock, hill};
use crate::curve::FitError;
use crate::domain::{FittedModel, HistoricalSeries};
use crate::numeric::{from_bounded, median, mean, to_bounded};
use crate::quality::MIN_HISTORY_DAYS;
use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::neldermead::NelderMead;

const KAPPA_FLOOR: f64 = 1e-6;
const SIMPLEX_STEP: f64 = 1.0;
const SD_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Adstock decay grid, inclusive on both ends.
    pub alpha_min: f64,
    pub alpha_max: f64,
    pub alpha_step: f64,

    pub beta_min: f64,
    pub beta_max: f64,

    /// Upper bound on `max_yield` as a multiple of the largest observed output.
    pub max_yield_multiplier: f64,

    /// Iteration cap for each solver run (one run per alpha).
    pub max_iters: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            alpha_min: 0.0,
            alpha_max: 0.8,
            alpha_step: 0.1,
            beta_min: 0.5,
            beta_max: 3.0,
            max_yield_multiplier: 3.0,
            max_iters: 2_000,
        }
    }
}

impl FitOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        let read_f64 = |key: &str| std::env::var(key).ok().and_then(|s| s.parse::<f64>().ok());
        if let Some(v) = read_f64("FIT_ALPHA_MIN") {
            out.alpha_min = v;
        }
        if let Some(v) = read_f64("FIT_ALPHA_MAX") {
            out.alpha_max = v;
        }
        if let Some(v) = read_f64("FIT_ALPHA_STEP") {
            out.alpha_step = v;
        }
        if let Some(v) = read_f64("FIT_BETA_MIN") {
            out.beta_min = v;
        }
        if let Some(v) = read_f64("FIT_BETA_MAX") {
            out.beta_max = v;
        }
        if let Some(v) = read_f64("FIT_MAX_YIELD_MULTIPLIER") {
            out.max_yield_multiplier = v;
        }
        if let Ok(s) = std::env::var("FIT_MAX_ITERS") {
            if let Ok(n) = s.parse::<u64>() {
                out.max_iters = n;
            }
        }

        out
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.alpha_min.is_finite() && self.alpha_max.is_finite() && self.alpha_min >= 0.0 && self.alpha_max < 1.0,
            "adstock alpha range must lie in [0, 1) (got {}..={})",
            self.alpha_min,
            self.alpha_max
        );
        anyhow::ensure!(
            self.alpha_min <= self.alpha_max,
            "FIT_ALPHA_MIN must be <= FIT_ALPHA_MAX"
        );
        anyhow::ensure!(
            self.alpha_step.is_finite() && self.alpha_step > 0.0,
            "FIT_ALPHA_STEP must be > 0 (got {})",
            self.alpha_step
        );
        anyhow::ensure!(
            self.beta_min.is_finite() && self.beta_min > 0.0 && self.beta_min < self.beta_max && self.beta_max.is_finite(),
            "beta range must satisfy 0 < min < max (got {}..={})",
            self.beta_min,
            self.beta_max
        );
        anyhow::ensure!(
            self.max_yield_multiplier.is_finite() && self.max_yield_multiplier >= 1.0,
            "FIT_MAX_YIELD_MULTIPLIER must be >= 1 (got {})",
            self.max_yield_multiplier
        );
        anyhow::ensure!(self.max_iters >= 1, "FIT_MAX_ITERS must be >= 1");
        Ok(())
    }

    pub fn alpha_grid(&self) -> Vec<f64> {
        let span = (self.alpha_max - self.alpha_min).max(0.0);
        let steps = (span / self.alpha_step + 1e-9).floor() as usize;
        (0..=steps)
            .map(|i| crate::numeric::round_to(self.alpha_min + i as f64 * self.alpha_step, 6))
            .filter(|a| *a < 1.0)
            .collect()
    }
}

/// Box constraints on `(max_yield, beta, kappa)`, enforced by solving in logit space.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    max_yield: (f64, f64),
    beta: (f64, f64),
    kappa: (f64, f64),
}

impl Bounds {
    fn decode(&self, u: &[f64]) -> (f64, f64, f64) {
        (
            to_bounded(u[0], self.max_yield.0, self.max_yield.1),
            to_bounded(u[1], self.beta.0, self.beta.1),
            to_bounded(u[2], self.kappa.0, self.kappa.1),
        )
    }

    fn encode(&self, max_yield: f64, beta: f64, kappa: f64) -> Vec<f64> {
        vec![
            from_bounded(max_yield, self.max_yield.0, self.max_yield.1),
            from_bounded(beta, self.beta.0, self.beta.1),
            from_bounded(kappa, self.kappa.0, self.kappa.1),
        ]
    }
}

/// Sum of squared residuals of the Hill curve, normalized by the output scale.
struct HillLeastSquares<'a> {
    spend: &'a [f64],
    output: &'a [f64],
    bounds: Bounds,
    scale: f64,
}

impl CostFunction for HillLeastSquares<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, u: &Self::Param) -> Result<Self::Output, Error> {
        let (max_yield, beta, kappa) = self.bounds.decode(u);
        let sse: f64 = self
            .spend
            .iter()
            .zip(self.output)
            .map(|(&x, &y)| {
                let e = (y - hill(x, max_yield, beta, kappa)) / self.scale;
                e * e
            })
            .sum();
        Ok(if sse.is_finite() { sse } else { f64::MAX })
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    alpha: f64,
    max_yield: f64,
    beta: f64,
    kappa: f64,
    r_squared: f64,
}

/// Fits a Hill curve to `series`, grid-searching the adstock decay and keeping the best R².
pub fn fit(series: &HistoricalSeries, opts: &FitOptions) -> Result<FittedModel, FitError> {
    let days = series.distinct_days();
    let required = MIN_HISTORY_DAYS as usize;
    if days < required {
        return Err(FitError::InsufficientHistory { days, required });
    }

    let spend = series.spends();
    let output = series.outputs();

    let (min_spend, max_spend) = spend
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    if max_spend - min_spend <= 1e-12 * max_spend.abs().max(1.0) {
        return Err(FitError::DegenerateInput {
            reason: "spend has zero variance".to_string(),
        });
    }

    let max_output = output.iter().copied().fold(0.0, f64::max);
    if max_output <= 0.0 {
        return Err(FitError::DegenerateInput {
            reason: "output is zero on every day".to_string(),
        });
    }

    opts.validate().map_err(|e| FitError::FitFailed {
        reason: format!("invalid fit options: {e}"),
    })?;

    let mut best: Option<Candidate> = None;
    for alpha in opts.alpha_grid() {
        let adstocked = apply_adstock(&spend, alpha);
        match fit_at_alpha(&adstocked, &output, max_output, alpha, opts) {
            Ok(candidate) => {
                tracing::debug!(alpha, r_squared = candidate.r_squared, "hill fit candidate");
                if best.map_or(true, |b| candidate.r_squared > b.r_squared) {
                    best = Some(candidate);
                }
            }
            Err(reason) => {
                tracing::debug!(alpha, %reason, "hill fit attempt failed");
            }
        }
    }

    let Some(best) = best else {
        return Err(FitError::FitFailed {
            reason: "curve fitting did not converge".to_string(),
        });
    };

    let model = FittedModel::new(best.alpha, best.beta, best.kappa, best.max_yield, best.r_squared)
        .map_err(|e| FitError::FitFailed { reason: e.to_string() })?;

    tracing::info!(
        days,
        alpha = model.alpha(),
        beta = model.beta(),
        kappa = model.kappa(),
        max_yield = model.max_yield(),
        r_squared = model.r_squared(),
        "fitted response curve"
    );
    Ok(model)
}

fn fit_at_alpha(
    adstocked: &[f64],
    output: &[f64],
    max_output: f64,
    alpha: f64,
    opts: &FitOptions,
) -> Result<Candidate, String> {
    let max_adstocked = adstocked.iter().copied().fold(0.0, f64::max);
    let positive: Vec<f64> = adstocked.iter().copied().filter(|x| *x > 0.0).collect();
    let kappa0 = median(&positive).ok_or_else(|| "no positive spend".to_string())?;

    let bounds = Bounds {
        max_yield: (max_output * 1e-6, max_output * opts.max_yield_multiplier),
        beta: (opts.beta_min, opts.beta_max),
        kappa: (KAPPA_FLOOR, (max_adstocked * 10.0).max(KAPPA_FLOOR * 10.0)),
    };

    let u0 = bounds.encode(
        (max_output * 1.5).min(bounds.max_yield.1),
        1.0_f64.clamp(opts.beta_min, opts.beta_max),
        kappa0.clamp(bounds.kappa.0, bounds.kappa.1),
    );
    let mut simplex = vec![u0.clone()];
    for i in 0..u0.len() {
        let mut vertex = u0.clone();
        vertex[i] += SIMPLEX_STEP;
        simplex.push(vertex);
    }

    let problem = HillLeastSquares {
        spend: adstocked,
        output,
        bounds,
        scale: max_output,
    };
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(SD_TOLERANCE)
        .map_err(|e| e.to_string())?;

    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(opts.max_iters))
        .run()
        .map_err(|e| e.to_string())?;

    let state = result.state();
    let u = state
        .get_best_param()
        .ok_or_else(|| "solver returned no parameters".to_string())?;
    let (max_yield, beta, kappa) = bounds.decode(u);
    if ![max_yield, beta, kappa].iter().all(|p| p.is_finite() && *p > 0.0) {
        return Err(format!(
            "non-finite parameters (max_yield={max_yield}, beta={beta}, kappa={kappa})"
        ));
    }

    let r_squared = r_squared(adstocked, output, max_yield, beta, kappa);
    Ok(Candidate {
        alpha,
        max_yield,
        beta,
        kappa,
        r_squared,
    })
}

/// In-sample goodness of fit, clamped to `[0, 1]`.
fn r_squared(spend: &[f64], output: &[f64], max_yield: f64, beta: f64, kappa: f64) -> f64 {
    let Some(mean_output) = mean(output) else {
        return 0.0;
    };
    let ss_tot: f64 = output.iter().map(|y| (y - mean_output).powi(2)).sum();
    if ss_tot <= 0.0 {
        return 0.0;
    }
    let ss_res: f64 = spend
        .iter()
        .zip(output)
        .map(|(&x, &y)| (y - hill(x, max_yield, beta, kappa)).powi(2))
        .sum();
    let r2 = 1.0 - ss_res / ss_tot;
    if r2.is_finite() {
        r2.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use chrono::{Duration, NaiveDate};

    fn series_from(points: &[(f64, f64)]) -> HistoricalSeries {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        HistoricalSeries::new(
            points
                .iter()
                .enumerate()
                .map(|(i, &(spend, output))| Observation {
                    date: start + Duration::days(i as i64),
                    spend,
                    output,
                })
                .collect(),
        )
        .unwrap()
    }

    fn synthetic(days: usize) -> HistoricalSeries {
        let points: Vec<(f64, f64)> = (0..days)
            .map(|i| {
                let spend = 100.0 + (i as f64 * 37.0) % 1400.0;
                let truth = hill(spend, 400.0, 1.2, 500.0);
                let wobble = 1.0 + 0.01 * (i as f64).sin();
                (spend, truth * wobble)
            })
            .collect();
        series_from(&points)
    }

    fn no_carryover() -> FitOptions {
        FitOptions {
            alpha_max: 0.0,
            ..FitOptions::default()
        }
    }

    #[test]
    fn recovers_synthetic_curve() {
        let model = fit(&synthetic(60), &no_carryover()).unwrap();
        assert!(model.r_squared() > 0.95, "r2 = {}", model.r_squared());
        assert_eq!(model.alpha(), 0.0);

        let truth = hill(800.0, 400.0, 1.2, 500.0);
        let fitted = model.evaluate(800.0);
        assert!((fitted - truth).abs() / truth < 0.05, "fitted {fitted} vs truth {truth}");
    }

    #[test]
    fn rejects_short_history() {
        let err = fit(&synthetic(20), &FitOptions::default()).unwrap_err();
        assert_eq!(err, FitError::InsufficientHistory { days: 20, required: 21 });
        assert!(err.to_string().contains("20 days < 21 required"));
    }

    #[test]
    fn rejects_zero_variance_spend() {
        let points: Vec<(f64, f64)> = (0..30).map(|i| (250.0, 10.0 + i as f64)).collect();
        let err = fit(&series_from(&points), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::DegenerateInput { .. }));
    }

    #[test]
    fn rejects_all_zero_output() {
        let points: Vec<(f64, f64)> = (0..30).map(|i| (100.0 + i as f64, 0.0)).collect();
        let err = fit(&series_from(&points), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::DegenerateInput { .. }));
    }

    #[test]
    fn alpha_grid_is_inclusive() {
        let grid = FitOptions::default().alpha_grid();
        assert_eq!(grid.len(), 9);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[8], 0.8);
    }

    #[test]
    fn validate_rejects_inverted_beta_range() {
        let opts = FitOptions {
            beta_min: 3.0,
            beta_max: 0.5,
            ..FitOptions::default()
        };
        assert!(opts.validate().is_err());
    }
}
